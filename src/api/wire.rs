//! Builder for create/update request bodies.
//!
//! Only fields that are present on the input reach the body, so an update
//! never clears a column the caller did not mention.

use serde::Serialize;
use serde_json::{Map, Value};

use super::common::{record_path, Address};

/// A CRM request body under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireBody(Map<String, Value>);

impl WireBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` when `value` is present.
    pub fn field<T: Serialize>(mut self, key: &str, value: &Option<T>) -> Self {
        if let Some(value) = value {
            match serde_json::to_value(value) {
                Ok(value) => {
                    self.0.insert(key.to_string(), value);
                }
                Err(e) => tracing::warn!(field = key, error = %e, "dropping unserializable field"),
            }
        }
        self
    }

    /// Insert `key` unconditionally.
    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// `{navigation}@odata.bind: /{entity_set}({id})` when an id is supplied.
    pub fn bind(self, navigation: &str, entity_set: &str, id: &Option<String>) -> Self {
        match id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => self.bind_id(navigation, entity_set, id),
            None => self,
        }
    }

    pub fn bind_id(mut self, navigation: &str, entity_set: &str, id: &str) -> Self {
        self.0.insert(
            format!("{}@odata.bind", navigation),
            Value::String(record_path(entity_set, id)),
        );
        self
    }

    /// Like [`bind`](Self::bind), but an empty id writes a null bind to
    /// detach the relationship.
    pub fn bind_or_clear(mut self, navigation: &str, entity_set: &str, id: &Option<String>) -> Self {
        match id.as_deref() {
            Some("") => {
                self.0
                    .insert(format!("{}@odata.bind", navigation), Value::Null);
                self
            }
            _ => self.bind(navigation, entity_set, id),
        }
    }

    /// Address parts onto `{prefix}_line1`, `{prefix}_city`, ...
    pub fn address(self, prefix: &str, address: &Option<Address>) -> Self {
        let Some(address) = address else {
            return self;
        };
        self.field(&format!("{}_line1", prefix), &address.street)
            .field(&format!("{}_line2", prefix), &address.street2)
            .field(&format!("{}_city", prefix), &address.city)
            .field(&format!("{}_stateorprovince", prefix), &address.state)
            .field(&format!("{}_postalcode", prefix), &address.postal_code)
            .field(&format!("{}_country", prefix), &address.country)
    }

    /// Caller-supplied raw attributes, merged last.
    pub fn custom(mut self, fields: &Option<Map<String, Value>>) -> Self {
        if let Some(fields) = fields {
            for (key, value) in fields {
                self.0.insert(key.clone(), value.clone());
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<WireBody> for Value {
    fn from(body: WireBody) -> Self {
        body.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_fields_are_skipped() {
        let body = WireBody::new()
            .field("firstname", &Some("Ann"))
            .field::<String>("lastname", &None)
            .field("telephone1", &Some(""));

        assert_eq!(body.len(), 2);
        assert_eq!(body.into_value(), json!({"firstname": "Ann", "telephone1": ""}));
    }

    #[test]
    fn test_unserializable_field_is_dropped() {
        let mut keyed = std::collections::HashMap::new();
        keyed.insert((1, 2), "pair key");

        let body = WireBody::new()
            .field("name", &Some("Contoso"))
            .field("broken", &Some(keyed));
        assert_eq!(body.into_value(), json!({"name": "Contoso"}));
    }

    #[test]
    fn test_bind_and_clear() {
        let body = WireBody::new()
            .bind("parentcustomerid_account", "accounts", &Some("C1".to_string()))
            .bind("ownerid", "systemusers", &None);
        assert_eq!(
            body.into_value(),
            json!({"parentcustomerid_account@odata.bind": "/accounts(C1)"})
        );

        let cleared =
            WireBody::new().bind_or_clear("parentcustomerid_account", "accounts", &Some(String::new()));
        assert_eq!(
            cleared.into_value(),
            json!({"parentcustomerid_account@odata.bind": null})
        );
    }

    #[test]
    fn test_custom_fields_merge_last() {
        let mut custom = Map::new();
        custom.insert("new_tier".to_string(), json!("gold"));
        custom.insert("firstname".to_string(), json!("Override"));

        let body = WireBody::new()
            .field("firstname", &Some("Ann"))
            .custom(&Some(custom));

        assert_eq!(
            body.into_value(),
            json!({"firstname": "Override", "new_tier": "gold"})
        );
    }

    #[test]
    fn test_address_prefix() {
        let address = Address {
            city: Some("Oslo".to_string()),
            postal_code: Some("0150".to_string()),
            ..Default::default()
        };
        let body = WireBody::new().address("billto", &Some(address));
        assert_eq!(
            body.into_value(),
            json!({"billto_city": "Oslo", "billto_postalcode": "0150"})
        );
    }
}
