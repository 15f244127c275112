//! FX rate types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Exchange rates against `base` (one unit of `base` buys `rates[c]` of `c`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub base: String,
    pub rates: BTreeMap<String, f64>,
    pub timestamp: i64,
    pub cached: bool,
}
