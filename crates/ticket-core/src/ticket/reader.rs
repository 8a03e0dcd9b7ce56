//! Receipt reader combining heuristics with the structured-extraction fallback.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::models::record::{ExtractionRecord, Field};

use super::fallback::{merge_fallback, FallbackExtractor, StructuredExtractionService};
use super::rules::{
    extract_label, format_ticket_date, is_card_slip, AmountExtractor, DateExtractor,
    FieldExtractor,
};

/// Reads OCR transcripts into extraction records.
pub struct TicketReader {
    date_extractor: DateExtractor,
    amount_extractor: AmountExtractor,
    fallback: FallbackExtractor,
    fallback_enabled: bool,
}

impl TicketReader {
    /// Create a reader with no fallback service and fallback mode off.
    pub fn new() -> Self {
        Self {
            date_extractor: DateExtractor::new(),
            amount_extractor: AmountExtractor::new(),
            fallback: FallbackExtractor::new(),
            fallback_enabled: false,
        }
    }

    /// Set the structured-extraction service.
    pub fn with_service(mut self, service: impl StructuredExtractionService + 'static) -> Self {
        self.fallback = FallbackExtractor::with_service(service);
        self
    }

    /// Set whether new records start in fallback mode.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    /// Whether a structured-extraction service is wired in.
    pub fn has_fallback_service(&self) -> bool {
        self.fallback.is_configured()
    }

    /// Extract and validate a record from a transcript.
    ///
    /// Card slips go through the heuristics; any other receipt goes through
    /// the fallback path. The automated path never fails: problems leave the
    /// record in `NeedsCorrection`.
    pub fn read(&self, name: impl Into<String>, transcript: impl Into<String>) -> ExtractionRecord {
        let start = Instant::now();
        let mut record = ExtractionRecord::new(name, transcript);
        record.set_uses_fallback(self.fallback_enabled);

        if is_card_slip(record.normalized_text()) {
            debug!(record = record.name(), "Card slip detected");
            self.read_card_slip(&mut record);
        } else {
            debug!(record = record.name(), "Generic receipt, using fallback path");
            self.run_fallback(&mut record);
        }

        info!(
            record = record.name(),
            status = %record.status(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Read receipt"
        );
        record
    }

    fn read_card_slip(&self, record: &mut ExtractionRecord) {
        let mut missing = Vec::new();

        match self.date_extractor.extract(record.source_text()) {
            Some(date) => {
                record.set_date(Some(format_ticket_date(date.value)));
                let label = extract_label(record.source_text(), &date);
                if label.is_none() {
                    missing.push(ExtractionError::FieldNotFound(Field::Label));
                }
                record.set_label(label);
            }
            None => missing.push(ExtractionError::FieldNotFound(Field::Date)),
        }

        match self.amount_extractor.extract(record.normalized_text()) {
            Some(amount) => record.set_amount(Some(amount.value)),
            None => {
                record.set_amount(None);
                missing.push(ExtractionError::FieldNotFound(Field::Amount));
            }
        }

        for error in missing {
            debug!(record = record.name(), "{}", error);
            record.push_warning(error.to_string());
        }

        record.revalidate();
    }

    /// Run the fallback path on a record, honoring its fallback mode.
    ///
    /// With fallback on, the service is asked at most once per record and the
    /// reply is cached; the heuristic date only fills an unset date so a
    /// corrected one survives. With fallback off, the heuristic date is
    /// re-extracted and only a cached reply is merged.
    pub fn run_fallback(&self, record: &mut ExtractionRecord) {
        if !record.uses_fallback() || record.date().is_none() {
            if let Some(date) = self.date_extractor.extract(record.source_text()) {
                record.set_date(Some(format_ticket_date(date.value)));
            }
        }

        if record.uses_fallback() {
            match self.fallback.fetch(record) {
                Ok(fields) => {
                    merge_fallback(record, &fields);
                    record.set_last_error(None);
                }
                Err(e) => {
                    warn!(record = record.name(), error = %e, "Fallback extraction failed");
                    record.set_last_error(Some(e.to_string()));
                }
            }
        } else if let Some(fields) = record.fallback().cloned() {
            merge_fallback(record, &fields);
        }

        record.revalidate();
    }

    /// Switch a record's fallback mode and re-run the fallback path.
    pub fn set_fallback_mode(&self, record: &mut ExtractionRecord, enabled: bool) {
        record.set_uses_fallback(enabled);
        self.run_fallback(record);
    }

    /// Drop the cached reply and request a new one.
    pub fn force_refresh_fallback(&self, record: &mut ExtractionRecord) {
        record.clear_fallback();
        self.set_fallback_mode(record, true);
    }
}

impl Default for TicketReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::models::record::RecordStatus;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Replays queued replies and counts requests.
    struct ScriptedService {
        replies: RefCell<Vec<Result<String, ServiceError>>>,
        calls: Rc<Cell<u32>>,
    }

    impl ScriptedService {
        fn new(replies: Vec<Result<String, ServiceError>>) -> (Self, Rc<Cell<u32>>) {
            let calls = Rc::new(Cell::new(0));
            let service = Self {
                replies: RefCell::new(replies.into_iter().rev().collect()),
                calls: calls.clone(),
            };
            (service, calls)
        }
    }

    impl StructuredExtractionService for ScriptedService {
        fn request(&self, _instruction: &str, _transcript: &str) -> Result<String, ServiceError> {
            self.calls.set(self.calls.get() + 1);
            self.replies
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }
    }

    const CARD_SLIP: &str = "CARTE BANCAIRE\nSANS CONTACT\n12/04/23 10:45\nSUPERMARCHE ACME\n75011 PARIS\nMONTANT 15,99 EUR\nDEBIT";

    const BOULANGERIE_REPLY: &str = r#"{"libelle":"Boulangerie","date":"01/01/2024","montant":"4.50"}"#;

    #[test]
    fn test_card_slip_scenario() {
        let record = TicketReader::new().read("acme.jpg", CARD_SLIP);

        assert_eq!(record.date(), Some("12/04/2023"));
        assert_eq!(record.label(), Some("CB Supermarche acme"));
        assert_eq!(record.amount(), Some("15,99"));
        assert_eq!(record.status(), RecordStatus::Valid);
        assert!(record.warnings().is_empty());
    }

    #[test]
    fn test_nothing_found_without_fallback() {
        let record = TicketReader::new().read("blank.jpg", "MERCI DE VOTRE VISITE\nA BIENTOT");

        assert_eq!(record.date(), None);
        assert_eq!(record.label(), None);
        assert_eq!(record.amount(), None);
        assert_eq!(record.status(), RecordStatus::NeedsCorrection);
    }

    #[test]
    fn test_card_slip_without_amount_keyword() {
        let record = TicketReader::new().read("a.jpg", "CARTE BANCAIRE\n12/04/23\nACME\nTOTAL 3,00 EUR");

        assert_eq!(record.amount(), None);
        assert_eq!(
            record.warnings().to_vec(),
            vec![ExtractionError::FieldNotFound(Field::Amount).to_string()]
        );
        assert_eq!(record.warnings()[0], "unable to read amount");
        assert_eq!(record.status(), RecordStatus::NeedsCorrection);
        assert_eq!(record.invalid_fields(), vec![Field::Amount]);
    }

    /// The period-decimal reply amount is stored comma-decimal, so the record
    /// is valid.
    #[test]
    fn test_fallback_fills_generic_receipt() {
        let (service, calls) = ScriptedService::new(vec![Ok(BOULANGERIE_REPLY.to_string())]);
        let reader = TicketReader::new().with_service(service).with_fallback(true);

        let record = reader.read("pain.jpg", "BOULANGERIE DU COIN\nBAGUETTE 1,20\nTOTAL 4.50");

        assert_eq!(calls.get(), 1);
        assert_eq!(record.date(), Some("01/01/2024"));
        assert_eq!(record.label(), Some("Boulangerie"));
        assert_eq!(record.amount(), Some("4,50"));
        assert_eq!(record.status(), RecordStatus::Valid);
    }

    #[test]
    fn test_malformed_reply_needs_correction() {
        let (service, _) = ScriptedService::new(vec![Ok("Désolé, je ne peux pas lire ce ticket.".to_string())]);
        let reader = TicketReader::new().with_service(service).with_fallback(true);

        let record = reader.read("flou.jpg", "ILLISIBLE");

        assert_eq!(record.status(), RecordStatus::NeedsCorrection);
        assert!(record.fallback().is_none());
        assert!(record.last_error().unwrap().contains("malformed fallback response"));
    }

    #[test]
    fn test_unavailable_service_needs_correction() {
        let (service, _) = ScriptedService::new(vec![Err(ServiceError::Unavailable {
            service: "chat",
            attempts: 2,
            reason: "connection refused".to_string(),
        })]);
        let reader = TicketReader::new().with_service(service).with_fallback(true);

        let record = reader.read("a.jpg", "EPICERIE");

        assert_eq!(record.status(), RecordStatus::NeedsCorrection);
        assert!(record.last_error().unwrap().contains("unavailable"));
    }

    #[test]
    fn test_fallback_enabled_without_service() {
        let reader = TicketReader::new().with_fallback(true);
        assert!(!reader.has_fallback_service());

        let record = reader.read("a.jpg", "EPICERIE");
        assert_eq!(record.status(), RecordStatus::NeedsCorrection);
        assert!(record.last_error().is_some());
    }

    #[test]
    fn test_heuristic_date_wins_over_reply() {
        let (service, _) = ScriptedService::new(vec![Ok(BOULANGERIE_REPLY.to_string())]);
        let reader = TicketReader::new().with_service(service).with_fallback(true);

        let record = reader.read("pain.jpg", "BOULANGERIE\nLE 03/02/24\nTOTAL 4,50");

        assert_eq!(record.date(), Some("03/02/2024"));
        assert_eq!(record.label(), Some("Boulangerie"));
    }

    #[test]
    fn test_card_slip_without_date_reports_missing_fields() {
        let record = TicketReader::new().read("a.jpg", "CARTE BANCAIRE\nACME\nMONTANT 3,00 EUR");

        assert_eq!(record.date(), None);
        assert_eq!(record.amount(), Some("3,00"));
        assert_eq!(
            record.warnings().to_vec(),
            vec![ExtractionError::FieldNotFound(Field::Date).to_string()]
        );
        assert_eq!(record.invalid_fields(), vec![Field::Date, Field::Label]);
    }

    #[test]
    fn test_toggle_keeps_corrected_date() {
        let (service, calls) = ScriptedService::new(vec![Ok(BOULANGERIE_REPLY.to_string())]);
        let reader = TicketReader::new().with_service(service);

        let mut record = reader.read("pain.jpg", "BOULANGERIE\nLE 03/02/24\nTOTAL");
        assert_eq!(record.date(), Some("03/02/2024"));

        let mut draft = record.begin_correction();
        draft.date = Some("04/02/2024".to_string());
        record.commit_correction(draft);

        reader.set_fallback_mode(&mut record, true);
        assert_eq!(calls.get(), 1);
        assert_eq!(record.date(), Some("04/02/2024"));
        assert_eq!(record.label(), Some("Boulangerie"));
    }

    #[test]
    fn test_toggle_reuses_cached_reply() {
        let (service, calls) = ScriptedService::new(vec![Ok(BOULANGERIE_REPLY.to_string())]);
        let reader = TicketReader::new().with_service(service);
        assert!(reader.has_fallback_service());

        let mut record = reader.read("pain.jpg", "BOULANGERIE");
        assert_eq!(calls.get(), 0);
        assert_eq!(record.status(), RecordStatus::NeedsCorrection);

        reader.set_fallback_mode(&mut record, true);
        assert_eq!(calls.get(), 1);
        assert!(record.is_valid());

        reader.set_fallback_mode(&mut record, false);
        reader.set_fallback_mode(&mut record, true);
        assert_eq!(calls.get(), 1);
        assert_eq!(record.label(), Some("Boulangerie"));
    }

    #[test]
    fn test_disabled_mode_merges_cached_reply() {
        let (service, calls) = ScriptedService::new(vec![Ok(BOULANGERIE_REPLY.to_string())]);
        let reader = TicketReader::new().with_service(service).with_fallback(true);

        let mut record = reader.read("pain.jpg", "BOULANGERIE");
        let mut draft = record.begin_correction();
        draft.label = None;
        record.commit_correction(draft);
        assert!(!record.is_valid());

        reader.set_fallback_mode(&mut record, false);
        assert_eq!(calls.get(), 1);
        assert_eq!(record.label(), Some("Boulangerie"));
        assert!(record.is_valid());
    }

    #[test]
    fn test_force_refresh_requests_again() {
        let (service, calls) = ScriptedService::new(vec![
            Ok(r#"{"libelle":"Boulangerie","date":null,"montant":"abc"}"#.to_string()),
            Ok(BOULANGERIE_REPLY.to_string()),
        ]);
        let reader = TicketReader::new().with_service(service).with_fallback(true);

        let mut record = reader.read("pain.jpg", "BOULANGERIE");
        assert!(!record.is_valid());

        reader.force_refresh_fallback(&mut record);
        assert_eq!(calls.get(), 2);
        assert!(record.is_valid());
        assert_eq!(record.fallback().and_then(|f| f.amount.as_deref()), Some("4.50"));
    }

    #[test]
    fn test_failed_request_is_retried_on_next_toggle() {
        let (service, calls) = ScriptedService::new(vec![
            Ok("not json".to_string()),
            Ok(BOULANGERIE_REPLY.to_string()),
        ]);
        let reader = TicketReader::new().with_service(service).with_fallback(true);

        let mut record = reader.read("pain.jpg", "BOULANGERIE");
        assert!(record.last_error().is_some());

        reader.set_fallback_mode(&mut record, true);
        assert_eq!(calls.get(), 2);
        assert!(record.is_valid());
        assert_eq!(record.last_error(), None);
    }

    #[test]
    fn test_manual_correction_after_read() {
        let mut record = TicketReader::new().read("a.jpg", "CARTE BANCAIRE\n12/04/23\nACME");
        assert!(!record.is_valid());

        let mut draft = record.begin_correction();
        draft.amount = Some("19,99".to_string());
        assert_eq!(record.commit_correction(draft), RecordStatus::Valid);

        let mut draft = record.begin_correction();
        draft.amount = Some("dix-neuf".to_string());
        assert_eq!(record.commit_correction(draft), RecordStatus::NeedsCorrection);
    }
}
