use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ContactId, ListId};

/// A prospect that can be enrolled in sequences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Delivery address. Contacts without one are never sent to.
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub company: Option<String>,

    /// Free-form values available to templates
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Lists this contact belongs to
    #[serde(default)]
    pub lists: Vec<ListId>,
}

impl Contact {
    #[must_use]
    pub fn new(id: impl Into<ContactId>, name: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.map(str::to_string),
            company: None,
            attributes: BTreeMap::new(),
            lists: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn in_list(mut self, list: impl Into<ListId>) -> Self {
        self.lists.push(list.into());
        self
    }

    /// Values exposed to templates.
    ///
    /// `name`, `first_name`, `email` and `company` are derived from the
    /// contact; explicit attributes with the same key take precedence.
    #[must_use]
    pub fn template_variables(&self) -> BTreeMap<String, String> {
        let mut variables = BTreeMap::new();

        variables.insert("name".to_string(), self.name.clone());
        variables.insert(
            "first_name".to_string(),
            self.name
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
        );
        if let Some(email) = &self.email {
            variables.insert("email".to_string(), email.clone());
        }
        if let Some(company) = &self.company {
            variables.insert("company".to_string(), company.clone());
        }

        variables.extend(
            self.attributes
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        variables
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_template_variables_derive_first_name() {
        let contact = Contact::new("c1", "Ada Lovelace", Some("ada@example.com"))
            .with_company("Analytical Engines");

        let variables = contact.template_variables();
        assert_eq!(variables["first_name"], "Ada");
        assert_eq!(variables["company"], "Analytical Engines");
        assert_eq!(variables["email"], "ada@example.com");
    }

    #[test]
    fn test_attributes_override_derived_values() {
        let contact = Contact::new("c1", "Ada Lovelace", None).with_attribute("first_name", "Countess");

        let variables = contact.template_variables();
        assert_eq!(variables["first_name"], "Countess");
        assert!(!variables.contains_key("email"));
    }
}
