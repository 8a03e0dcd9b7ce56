//! Structured-extraction fallback through a language-model service.

use tracing::{debug, info};

use crate::error::{ExtractionError, FallbackError, ServiceError};
use crate::models::record::{ExtractionRecord, FallbackFields};

/// Instruction sent with every structured-extraction request.
pub const SYSTEM_INSTRUCTION: &str = "Tu lis des tickets de caisse français. \
On te transmet le texte brut reconnu sur un ticket. \
Retrouve trois informations : le libellé de l'achat (le magasin ou la raison de la dépense, court mais explicite, \
précédé de \"CB \" si le paiement a été fait par carte bancaire), la date de l'achat et le montant total. \
Réponds uniquement avec un objet JSON de la forme {\"libelle\": \"...\", \"date\": \"jj/mm/aaaa\", \"montant\": \"nombre\"}, \
sans aucun autre texte. Le montant est une chaîne contenant un nombre. \
Si une information est introuvable, mets null.";

/// A service that turns a receipt transcript into a JSON reply.
pub trait StructuredExtractionService {
    /// Send the instruction and transcript; return the raw reply text.
    fn request(&self, instruction: &str, transcript: &str) -> Result<String, ServiceError>;
}

impl<S: StructuredExtractionService + ?Sized> StructuredExtractionService for Box<S> {
    fn request(&self, instruction: &str, transcript: &str) -> Result<String, ServiceError> {
        (**self).request(instruction, transcript)
    }
}

/// Fetches and caches structured-extraction replies.
pub struct FallbackExtractor {
    service: Option<Box<dyn StructuredExtractionService>>,
}

impl FallbackExtractor {
    pub fn new() -> Self {
        Self { service: None }
    }

    pub fn with_service(service: impl StructuredExtractionService + 'static) -> Self {
        Self {
            service: Some(Box::new(service)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    /// Cached reply for the record, requesting it first if needed.
    pub fn fetch(&self, record: &mut ExtractionRecord) -> Result<FallbackFields, FallbackError> {
        if let Some(cached) = record.fallback() {
            debug!(record = record.name(), "Using cached fallback reply");
            return Ok(cached.clone());
        }

        let service = self.service.as_ref().ok_or(FallbackError::NotConfigured)?;

        info!(record = record.name(), "Requesting structured extraction");
        let raw = service.request(SYSTEM_INSTRUCTION, record.source_text())?;
        let fields = parse_fallback_response(&raw)?;

        record.cache_fallback(fields.clone());
        Ok(fields)
    }
}

impl Default for FallbackExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill the record from a reply.
///
/// The date is taken only when none is set; label and amount always come from
/// the reply.
pub fn merge_fallback(record: &mut ExtractionRecord, fields: &FallbackFields) {
    if record.date().is_none() {
        record.set_date(fields.date.clone());
    }
    record.set_label(fields.label.clone());
    record.set_amount(fields.amount.clone());
}

/// Decode a reply into its three fields.
///
/// Markdown fences and text around the outermost JSON object are ignored;
/// anything else that is not the expected object is an error.
pub fn parse_fallback_response(raw: &str) -> Result<FallbackFields, ExtractionError> {
    let malformed = |reason: String| ExtractionError::MalformedFallbackResponse {
        reason,
        raw: raw.to_string(),
    };

    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = trimmed
        .find('{')
        .ok_or_else(|| malformed("no JSON object in reply".to_string()))?;
    let end = trimmed
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| malformed("unterminated JSON object".to_string()))?;

    serde_json::from_str(&trimmed[start..=end]).map_err(|e| malformed(e.to_string()))
}
