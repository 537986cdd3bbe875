use illustration_agreement_template::Field;
use std::collections::BTreeMap;

/// Submitted form values keyed by field name. Unknown keys are carried along
/// but never rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    values: BTreeMap<String, String>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// The submitted value, if any. Empty strings count as absent.
    pub fn submitted(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn value_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.submitted(key).unwrap_or(fallback)
    }

    pub fn get(&self, field: Field) -> &str {
        self.value_or(field.key(), field.default_value())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn resolve(&self) -> ResolvedFields {
        let mut values = BTreeMap::new();
        let mut defaulted = Vec::new();
        for field in Field::ALL {
            let value = match self.submitted(field.key()) {
                Some(value) => value,
                None => {
                    defaulted.push(field);
                    field.default_value()
                }
            };
            values.insert(field, value.to_string());
        }
        ResolvedFields { values, defaulted }
    }
}

impl<K, V> FromIterator<(K, V)> for FieldSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

/// Every recognized field mapped to its submitted value or default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFields {
    values: BTreeMap<Field, String>,
    defaulted: Vec<Field>,
}

impl ResolvedFields {
    pub fn get(&self, field: Field) -> &str {
        self.values
            .get(&field)
            .map(String::as_str)
            .unwrap_or_else(|| field.default_value())
    }

    pub fn by_key(&self, key: &str) -> Option<&str> {
        Field::from_key(key).map(|field| self.get(field))
    }

    /// Fields that fell back to their default, in declaration order.
    pub fn defaulted(&self) -> &[Field] {
        &self.defaulted
    }

    pub fn is_defaulted(&self, field: Field) -> bool {
        self.defaulted.contains(&field)
    }
}
