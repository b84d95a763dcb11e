//! Batch preprocessing for composer MIDI corpora.
//!
//! Every step is best-effort: a file or folder that cannot be processed is
//! logged and skipped so the rest of the corpus still goes through.

pub mod chunks;
pub mod discover;
pub mod fit;
pub mod layout;
pub mod profiles;
pub mod report;
pub mod table;

pub use chunks::{summarize_corpus, write_chunks, ChunkRecord};
pub use discover::{composer_of, is_midi, load_score, midi_files};
pub use fit::{fit_corpus, FitSummary, FittedCorpus};
pub use layout::{init, merge_splits, select, FlattenStats, SPLITS};
pub use profiles::{extract_composers, profile_dir, segment_composers};
pub use report::{write_reports, ColumnStats};
pub use table::{aggregate, Table, COMPOSER_COLUMN};
