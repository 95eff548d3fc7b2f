//! Training dataset preparation: batch folders for labelling, label matching, and
//! the train / val / test partition.

pub mod batch;
pub mod pairs;
pub mod split;

pub use batch::{DEFAULT_BATCH_SIZE, create_batches};
pub use pairs::{FilePair, PairScan, collect_batched_pairs, collect_pairs};
pub use split::{DatasetSplit, SplitRatios, SplitReport, partition, write_split};
