use crate::JobApplicationRecord;

/// Records already persisted, loaded once per batch run.
///
/// The snapshot only grows through [`ApplicationSnapshot::record`], which the
/// caller invokes after a row was actually written, so later candidates in the
/// same run are checked against it too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationSnapshot {
    records: Vec<JobApplicationRecord>,
}

impl ApplicationSnapshot {
    pub fn new(records: Vec<JobApplicationRecord>) -> Self {
        Self { records }
    }

    /// True when some stored record has the same company, role and date.
    /// The classification text is not compared.
    pub fn exists(&self, candidate: &JobApplicationRecord) -> bool {
        self.records.iter().any(|r| {
            r.company == candidate.company
                && r.role == candidate.role
                && r.date_applied == candidate.date_applied
        })
    }

    /// Whether a candidate should be appended: a positive verdict that is
    /// not yet stored.
    pub fn should_append(&self, candidate: &JobApplicationRecord) -> bool {
        candidate.is_application_response() && !self.exists(candidate)
    }

    pub fn record(&mut self, persisted: JobApplicationRecord) {
        self.records.push(persisted);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[JobApplicationRecord] {
        &self.records
    }
}

impl FromIterator<JobApplicationRecord> for ApplicationSnapshot {
    fn from_iter<T: IntoIterator<Item = JobApplicationRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
