//! Per-receipt extraction record.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::ticket::normalize_text;
use crate::ticket::validate::{validate_fields, Verdict};

/// One of the three extracted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Date,
    Label,
    Amount,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Date => write!(f, "date"),
            Field::Label => write!(f, "label"),
            Field::Amount => write!(f, "amount"),
        }
    }
}

/// Verdict of the last validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// All three fields are well-formed.
    Valid,
    /// At least one field must be fixed by hand.
    NeedsCorrection,
}

impl RecordStatus {
    pub fn is_valid(self) -> bool {
        self == RecordStatus::Valid
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Valid => write!(f, "valid"),
            RecordStatus::NeedsCorrection => write!(f, "needs correction"),
        }
    }
}

/// Fields returned by the structured-extraction service.
///
/// Keys follow the service contract (`libelle`, `date`, `montant`); any other
/// key is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackFields {
    /// Short label of the purchase.
    #[serde(rename = "libelle", default)]
    pub label: Option<String>,

    /// Purchase date as `dd/mm/yyyy`.
    #[serde(default)]
    pub date: Option<String>,

    /// Total amount as a numeric string.
    #[serde(rename = "montant", default, deserialize_with = "string_or_number")]
    pub amount: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

/// Extraction state for one receipt image.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRecord {
    name: String,
    source_text: String,
    normalized_text: String,
    date: Option<String>,
    label: Option<String>,
    amount: Option<String>,
    status: RecordStatus,
    uses_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<FallbackFields>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

impl ExtractionRecord {
    /// Create a record from an OCR transcript. Nothing is extracted yet.
    pub fn new(name: impl Into<String>, source_text: impl Into<String>) -> Self {
        let source_text = source_text.into();
        let normalized_text = normalize_text(&source_text);
        Self {
            name: name.into(),
            source_text,
            normalized_text,
            date: None,
            label: None,
            amount: None,
            status: RecordStatus::NeedsCorrection,
            uses_fallback: false,
            fallback: None,
            warnings: Vec::new(),
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn amount(&self) -> Option<&str> {
        self.amount.as_deref()
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    pub fn uses_fallback(&self) -> bool {
        self.uses_fallback
    }

    /// Cached structured-extraction reply, if one was fetched.
    pub fn fallback(&self) -> Option<&FallbackFields> {
        self.fallback.as_ref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Error from the most recent automated pass, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Fields that currently fail validation.
    pub fn invalid_fields(&self) -> Vec<Field> {
        self.verdict().failing()
    }

    /// Re-run validation over the current fields and update the status.
    ///
    /// A valid amount written with a period is stored with a comma.
    pub fn revalidate(&mut self) -> RecordStatus {
        let verdict = self.verdict();
        if verdict.amount {
            if let Some(amount) = self.amount.as_mut() {
                if amount.contains('.') {
                    *amount = amount.replace('.', ",");
                }
            }
        }
        self.status = if verdict.all() {
            RecordStatus::Valid
        } else {
            RecordStatus::NeedsCorrection
        };
        debug!(
            record = %self.name,
            date = verdict.date,
            label = verdict.label,
            amount = verdict.amount,
            "validated record"
        );
        self.status
    }

    /// Snapshot the fields for manual editing.
    pub fn begin_correction(&self) -> CorrectionDraft {
        CorrectionDraft {
            date: self.date.clone(),
            label: self.label.clone(),
            amount: self.amount.clone(),
        }
    }

    /// Apply an edited draft and re-validate.
    ///
    /// Blank values clear the field.
    pub fn commit_correction(&mut self, draft: CorrectionDraft) -> RecordStatus {
        self.date = non_blank(draft.date);
        self.label = non_blank(draft.label);
        self.amount = non_blank(draft.amount);
        self.revalidate()
    }

    fn verdict(&self) -> Verdict {
        validate_fields(
            self.date.as_deref(),
            self.label.as_deref(),
            self.amount.as_deref(),
        )
    }

    pub(crate) fn set_date(&mut self, date: Option<String>) {
        self.date = date;
    }

    pub(crate) fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub(crate) fn set_amount(&mut self, amount: Option<String>) {
        self.amount = amount;
    }

    pub(crate) fn set_uses_fallback(&mut self, enabled: bool) {
        self.uses_fallback = enabled;
    }

    pub(crate) fn cache_fallback(&mut self, fields: FallbackFields) {
        self.fallback = Some(fields);
    }

    pub(crate) fn clear_fallback(&mut self) {
        self.fallback = None;
    }

    pub(crate) fn push_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub(crate) fn set_last_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }
}

impl fmt::Display for ExtractionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} : {}-{}-{}",
            self.name,
            self.date.as_deref().unwrap_or("?"),
            self.label.as_deref().unwrap_or("?"),
            self.amount.as_deref().unwrap_or("?"),
        )
    }
}

/// Pending manual edits to a record.
///
/// Changes stay here until passed to [`ExtractionRecord::commit_correction`];
/// dropping the draft abandons them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionDraft {
    pub date: Option<String>,
    pub label: Option<String>,
    pub amount: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
