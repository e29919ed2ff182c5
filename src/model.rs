use serde::{Deserialize, Serialize};

/// One physical location a user can work from.
///
/// `key` is assigned by the remote store when the workplace is created and is
/// `None` until then. On the wire the key and photo travel as `firebaseKey`
/// and `b64PhotoEncoding`, the names existing remote records use. `saved` is
/// a per-user projection of the remote saved-set and never leaves the process
/// through serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkPlace {
    #[serde(
        rename = "firebaseKey",
        alias = "key",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub outside: bool,
    #[serde(
        rename = "b64PhotoEncoding",
        alias = "photoEncoding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_encoding: Option<String>,
    #[serde(skip)]
    pub saved: bool,
}

impl WorkPlace {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        latitude: f64,
        longitude: f64,
        outside: bool,
    ) -> Self {
        Self {
            key: None,
            name: name.into(),
            address: address.into(),
            latitude,
            longitude,
            outside,
            photo_encoding: None,
            saved: false,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_saved(mut self, saved: bool) -> Self {
        self.saved = saved;
        self
    }

    pub fn same_coordinates(&self, other: &WorkPlace) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

/// Persisted workplaces compare by key. Coordinates are only used while one
/// side has not been through the create pipeline yet.
impl PartialEq for WorkPlace {
    fn eq(&self, other: &Self) -> bool {
        match (self.key(), other.key()) {
            (Some(a), Some(b)) => a == b,
            _ => self.same_coordinates(other),
        }
    }
}

/// How a remote saved-key fetch is applied to the cached `saved` flags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Only turn flags on; rows missing from the remote set keep their flag.
    #[default]
    Additive,
    /// Clear every flag, then turn on the ones in the remote set.
    Authoritative,
}

impl ReconcileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileMode::Additive => "additive",
            ReconcileMode::Authoritative => "authoritative",
        }
    }
}

/// The caller-facing workflows, each with its own result channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    FetchAll,
    FetchSaved,
    Create,
    Save,
    Remove,
}

impl Workflow {
    pub const ALL: [Workflow; 5] = [
        Workflow::FetchAll,
        Workflow::FetchSaved,
        Workflow::Create,
        Workflow::Save,
        Workflow::Remove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::FetchAll => "fetch_all",
            Workflow::FetchSaved => "fetch_saved",
            Workflow::Create => "create",
            Workflow::Save => "save",
            Workflow::Remove => "remove",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyed_workplaces_compare_by_key() {
        let a = WorkPlace::new("Library", "Main St 1", 45.0, 9.0, false).with_key("k1");
        let b = WorkPlace::new("Library", "Main St 1", 45.0, 9.0, false).with_key("k2");
        let c = WorkPlace::new("Other", "Elsewhere", 1.0, 2.0, true).with_key("k1");
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn unkeyed_workplaces_compare_by_coordinates() {
        let pending = WorkPlace::new("Cafe", "Via Roma", 45.5, 9.2, false);
        let persisted = WorkPlace::new("Cafe X", "Via Roma 2", 45.5, 9.2, true).with_key("k9");
        assert_eq!(pending, persisted);
        assert_ne!(pending, WorkPlace::new("Cafe", "Via Roma", 45.5, 9.3, false));
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let wp = WorkPlace::new("a", "b", 0.0, 0.0, false).with_key("");
        assert!(wp.key().is_none());
    }

    #[test]
    fn saved_flag_is_not_serialized() {
        let wp = WorkPlace::new("Park", "Green Rd", 1.5, 2.5, true)
            .with_key("abc")
            .with_saved(true);
        let value = serde_json::to_value(&wp).unwrap();
        assert!(value.get("saved").is_none());
        assert_eq!(value["firebaseKey"], "abc");
        assert!(value.get("key").is_none());
        assert_eq!(value["outside"], true);
        assert!(value.get("b64PhotoEncoding").is_none());
    }

    #[test]
    fn wire_names_and_legacy_aliases_both_parse() {
        let stored: WorkPlace = serde_json::from_value(json!({
            "firebaseKey": "-Nabc",
            "name": "Library",
            "latitude": 1.0,
            "longitude": 2.0,
            "b64PhotoEncoding": "AQID"
        }))
        .unwrap();
        assert_eq!(stored.key(), Some("-Nabc"));
        assert_eq!(stored.photo_encoding.as_deref(), Some("AQID"));

        let legacy: WorkPlace = serde_json::from_value(json!({
            "key": "k1",
            "latitude": 1.0,
            "longitude": 2.0,
            "photoEncoding": "AQID"
        }))
        .unwrap();
        assert_eq!(legacy.key(), Some("k1"));
        assert_eq!(legacy.photo_encoding.as_deref(), Some("AQID"));
    }

    #[test]
    fn deserialize_tolerates_missing_fields() {
        let wp: WorkPlace =
            serde_json::from_value(json!({ "latitude": 1.0, "longitude": 2.0, "saved": true }))
                .unwrap();
        assert!(wp.key.is_none());
        assert_eq!(wp.name, "");
        assert!(!wp.saved);
    }

    #[test]
    fn workflow_names_are_distinct() {
        let mut names: Vec<_> = Workflow::ALL.iter().map(Workflow::as_str).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Workflow::ALL.len());
    }

    #[test]
    fn reconcile_mode_parses_lowercase() {
        let mode: ReconcileMode = serde_yaml::from_str("authoritative").unwrap();
        assert_eq!(mode, ReconcileMode::Authoritative);
        assert_eq!(ReconcileMode::default().as_str(), "additive");
    }
}
