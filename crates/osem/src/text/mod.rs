//! Pure text utilities used by classification and catch-up search.

pub mod fingerprint;
pub mod message_id;
pub mod mojibake;
pub mod participant;
pub mod subject;
pub mod thread_index;

pub use fingerprint::{body_fingerprint, dice_similarity, fingerprints_similar};
pub use message_id::{extract_message_ids, normalize_message_id};
pub use mojibake::repair_mojibake;
pub use participant::normalize_participant;
pub use subject::{extract_historical_subjects, normalize_subject};
pub use thread_index::{thread_index_prefix, thread_root};
