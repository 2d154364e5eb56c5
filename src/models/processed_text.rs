use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The preprocessor's output. Bound 1:1 to the `RawItem` that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedText {
    pub cleaned_text: String,
    pub removed_counts: HashMap<String, u32>,
    pub success: bool,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl ProcessedText {
    pub fn failed() -> Self {
        Self {
            cleaned_text: String::new(),
            removed_counts: HashMap::new(),
            success: false,
            duration: Duration::ZERO,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
