//! The six standard corpus detectors

mod amount_manipulation;
mod coordinated_tampering;
mod duplicate_signature;
mod identity_reuse;
mod rapid_submissions;
mod template_fraud;

pub use amount_manipulation::AmountManipulationDetector;
pub use coordinated_tampering::CoordinatedTamperingDetector;
pub use duplicate_signature::DuplicateSignatureDetector;
pub use identity_reuse::IdentityReuseDetector;
pub use rapid_submissions::RapidSubmissionsDetector;
pub use template_fraud::TemplateFraudDetector;

use std::collections::BTreeSet;

use crate::patterns::CorpusEntry;

/// Distinct submitters among the given entries
pub(crate) fn submitters_of<'a, I>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a CorpusEntry>,
{
    entries
        .into_iter()
        .filter_map(|e| e.submitter.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
