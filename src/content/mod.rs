pub mod segmenter;

pub use segmenter::{Inline, Segment, segment};
