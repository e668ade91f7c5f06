use serde::{Deserialize, Serialize};

/// One morning self-report, produced by exactly one extractor stage.
///
/// Numeric fields stay `Option` all the way into storage: a user who reports
/// zero hours of sleep is distinguishable from one who didn't mention sleep
/// at all. Rendering "not reported" happens at the prompt layer, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorningCheckin {
    pub sleep_hours: Option<f64>,
    pub mood: Option<i32>,
    pub energy: Option<i32>,
    pub notes: String,
}
