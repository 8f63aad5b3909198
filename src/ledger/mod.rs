pub mod paper;

pub use paper::{PaperLedger, PaperStats};
