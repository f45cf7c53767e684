use serde::{Deserialize, Serialize};

use crate::manifest::{source::Sources, storage::Storage};

fn default_storage() -> Storage {
    Storage::default()
}

fn default_sources() -> Sources {
    Sources::default()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Manifest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    #[serde(default = "default_storage")]
    pub storage: Storage,

    #[serde(default = "default_sources", skip_serializing_if = "Sources::is_empty")]
    pub sources: Sources,
}
