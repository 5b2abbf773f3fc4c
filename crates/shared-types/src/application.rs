use serde::{Deserialize, Serialize};

/// Sentinel for a field the classifier could not determine.
pub const NOT_AVAILABLE: &str = "N/A";

/// Classification value marking a reply to a job application.
pub const APPLICATION_RESPONSE: &str = "Application Response";

/// Classification used when the verdict names none.
pub const OTHER: &str = "Other";

/// A classified message, and the shape of one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplicationRecord {
    pub classification: String,
    pub company: String,
    pub role: String,
    pub date_applied: String,
}

impl Default for JobApplicationRecord {
    fn default() -> Self {
        Self {
            classification: OTHER.to_string(),
            company: NOT_AVAILABLE.to_string(),
            role: NOT_AVAILABLE.to_string(),
            date_applied: NOT_AVAILABLE.to_string(),
        }
    }
}

impl JobApplicationRecord {
    /// Parse the classifier's textual verdict.
    ///
    /// Each line is split on its first colon. Only the exact keys
    /// `Classification`, `Company`, `Role` and `Date Applied` are used; every
    /// other line is ignored and missing keys keep their defaults. The
    /// classification value is taken verbatim.
    pub fn parse_verdict(text: &str) -> Self {
        let mut record = Self::default();

        for line in text.split('\n') {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();

            match key.trim() {
                "Classification" => record.classification = value,
                "Company" => record.company = value,
                "Role" => record.role = value,
                "Date Applied" => record.date_applied = value,
                _ => {}
            }
        }

        record
    }

    /// Replace an unknown `date_applied` with the given date.
    pub fn with_fallback_date(mut self, date: &str) -> Self {
        if self.date_applied == NOT_AVAILABLE {
            self.date_applied = date.to_string();
        }
        self
    }

    /// Build a record from a stored spreadsheet row `[company, role, date]`.
    ///
    /// Stored rows are application responses by construction. Trailing
    /// cells the store omitted read as empty strings.
    pub fn from_row(row: &[String]) -> Self {
        let cell = |idx: usize| row.get(idx).cloned().unwrap_or_default();
        Self {
            classification: APPLICATION_RESPONSE.to_string(),
            company: cell(0),
            role: cell(1),
            date_applied: cell(2),
        }
    }

    /// Cells appended to the spreadsheet for this record.
    pub fn to_row(&self) -> [String; 3] {
        [
            self.company.clone(),
            self.role.clone(),
            self.date_applied.clone(),
        ]
    }

    /// Canonical verdict text; parsing it yields this record again.
    pub fn to_verdict_text(&self) -> String {
        format!(
            "Classification: {}\nCompany: {}\nRole: {}\nDate Applied: {}",
            self.classification, self.company, self.role, self.date_applied
        )
    }

    pub fn is_application_response(&self) -> bool {
        self.classification == APPLICATION_RESPONSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str =
        "Classification: Application Response\nCompany: Acme\nRole: SWE\nDate Applied: 2024-01-05";

    fn record(classification: &str, company: &str, role: &str, date: &str) -> JobApplicationRecord {
        JobApplicationRecord {
            classification: classification.to_string(),
            company: company.to_string(),
            role: role.to_string(),
            date_applied: date.to_string(),
        }
    }

    #[test]
    fn test_parse_full_verdict() {
        let parsed = JobApplicationRecord::parse_verdict(EXAMPLE);
        assert_eq!(
            parsed,
            record(APPLICATION_RESPONSE, "Acme", "SWE", "2024-01-05")
        );
        assert!(parsed.is_application_response());
    }

    #[test]
    fn test_missing_date_uses_fallback() {
        let text = "Classification: Application Response\nCompany: Acme\nRole: SWE";
        let parsed = JobApplicationRecord::parse_verdict(text);
        assert_eq!(parsed.date_applied, NOT_AVAILABLE);

        let filled = parsed.with_fallback_date("2024-03-01");
        assert_eq!(filled.date_applied, "2024-03-01");
    }

    #[test]
    fn test_fallback_keeps_parsed_date() {
        let filled = JobApplicationRecord::parse_verdict(EXAMPLE).with_fallback_date("2024-03-01");
        assert_eq!(filled.date_applied, "2024-01-05");
    }

    #[test]
    fn test_garbage_yields_defaults() {
        let parsed = JobApplicationRecord::parse_verdict("I cannot help with that.\n\n");
        assert_eq!(parsed, JobApplicationRecord::default());
        assert_eq!(parsed.classification, OTHER);
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let parsed = JobApplicationRecord::parse_verdict("Role: Engineer: Platform \nCompany:Acme");
        assert_eq!(parsed.role, "Engineer: Platform");
        assert_eq!(parsed.company, "Acme");
    }

    #[test]
    fn test_keys_are_exact() {
        let text = "classification: Application Response\nCOMPANY: Acme\nDate applied: 2024-01-01\n  Role  :  SWE  ";
        let parsed = JobApplicationRecord::parse_verdict(text);
        assert_eq!(parsed.classification, OTHER);
        assert_eq!(parsed.company, NOT_AVAILABLE);
        assert_eq!(parsed.date_applied, NOT_AVAILABLE);
        assert_eq!(parsed.role, "SWE");
    }

    #[test]
    fn test_classification_is_not_validated() {
        let parsed = JobApplicationRecord::parse_verdict("Classification: Application Response.");
        assert_eq!(parsed.classification, "Application Response.");
        assert!(!parsed.is_application_response());
    }

    #[test]
    fn test_carriage_returns_are_trimmed() {
        let parsed = JobApplicationRecord::parse_verdict(
            "Classification: Application Response\r\nCompany: Acme\r\n",
        );
        assert!(parsed.is_application_response());
        assert_eq!(parsed.company, "Acme");
    }

    #[test]
    fn test_reparse_canonical_text() {
        for original in [
            record(APPLICATION_RESPONSE, "Acme", "SWE", "2024-01-05"),
            JobApplicationRecord::default(),
            record(OTHER, "Initech", "TPS Analyst", "N/A"),
        ] {
            let reparsed = JobApplicationRecord::parse_verdict(&original.to_verdict_text());
            assert_eq!(reparsed, original);
        }
    }

    #[test]
    fn test_rows() {
        let rec = record(APPLICATION_RESPONSE, "Acme", "SWE", "2024-01-05");
        assert_eq!(rec.to_row(), ["Acme", "SWE", "2024-01-05"].map(String::from));

        let short = JobApplicationRecord::from_row(&["Acme".to_string()]);
        assert_eq!(short, record(APPLICATION_RESPONSE, "Acme", "", ""));
    }
}
