use serde::{Deserialize, Serialize};

/// A table the loader owns: it gets the `updated_at` trigger at setup and the
/// keys here feed `create_table` when the table is first built.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManagedTable {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostgresDetails {
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<ManagedTable>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_create_tables: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Storage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresDetails>,
}

impl Storage {
    pub fn postgres_enabled(&self) -> bool {
        match &self.postgres {
            Some(details) => details.enabled,
            None => false,
        }
    }

    pub fn postgres_disable_create_tables(&self) -> bool {
        if !self.postgres_enabled() {
            return true;
        }

        self.postgres
            .as_ref()
            .is_some_and(|details| details.disable_create_tables.unwrap_or_default())
    }

    pub fn postgres_schemas(&self) -> Vec<String> {
        if !self.postgres_enabled() {
            return vec![];
        }

        self.postgres.as_ref().and_then(|details| details.schemas.clone()).unwrap_or_default()
    }

    pub fn postgres_tables(&self) -> Vec<String> {
        if !self.postgres_enabled() {
            return vec![];
        }

        self.postgres
            .as_ref()
            .and_then(|details| details.tables.as_ref())
            .map(|tables| tables.iter().map(|table| table.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn table_keys(&self, table_name: &str) -> Option<Vec<String>> {
        self.postgres
            .as_ref()
            .and_then(|details| details.tables.as_ref())
            .and_then(|tables| tables.iter().find(|table| table.name == table_name))
            .and_then(|table| table.keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_postgres_hides_tables_and_schemas() {
        let storage = Storage {
            postgres: Some(PostgresDetails {
                enabled: false,
                schemas: Some(vec!["finance".to_string()]),
                tables: Some(vec![ManagedTable { name: "finance.rates".to_string(), keys: None }]),
                disable_create_tables: None,
            }),
        };

        assert!(!storage.postgres_enabled());
        assert!(storage.postgres_disable_create_tables());
        assert!(storage.postgres_schemas().is_empty());
        assert!(storage.postgres_tables().is_empty());
    }

    #[test]
    fn test_table_keys_lookup() {
        let storage = Storage {
            postgres: Some(PostgresDetails {
                enabled: true,
                schemas: None,
                tables: Some(vec![ManagedTable {
                    name: "finance.rates".to_string(),
                    keys: Some(vec!["recorded_at".to_string(), "target".to_string()]),
                }]),
                disable_create_tables: None,
            }),
        };

        assert_eq!(
            storage.table_keys("finance.rates"),
            Some(vec!["recorded_at".to_string(), "target".to_string()])
        );
        assert_eq!(storage.table_keys("finance.other"), None);
    }
}
