//! Element locator descriptors
//!
//! A [`Locator`] is a description of how to find an element, never a live
//! handle. It is rendered to a Playwright locator expression each time a
//! script uses it, so nothing survives a navigation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// ARIA roles the page objects query by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Alert,
    Button,
    Cell,
    Checkbox,
    Dialog,
    Heading,
    Link,
    Row,
    Searchbox,
    Status,
    Textbox,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Alert => "alert",
            Role::Button => "button",
            Role::Cell => "cell",
            Role::Checkbox => "checkbox",
            Role::Dialog => "dialog",
            Role::Heading => "heading",
            Role::Link => "link",
            Role::Row => "row",
            Role::Searchbox => "searchbox",
            Role::Status => "status",
            Role::Textbox => "textbox",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Query {
    Role { role: Role, name: Option<String> },
    Label(String),
    Text(String),
    TestId(String),
}

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    query: Query,
    exact: bool,
    has_text: Option<String>,
    parent: Option<Box<Locator>>,
    first: bool,
}

impl Locator {
    fn from_query(query: Query) -> Self {
        Self {
            query,
            exact: false,
            has_text: None,
            parent: None,
            first: false,
        }
    }

    /// Element with `role` and accessible name `name`
    pub fn role(role: Role, name: impl Into<String>) -> Self {
        Self::from_query(Query::Role {
            role,
            name: Some(name.into()),
        })
    }

    /// Any element with `role`
    pub fn any(role: Role) -> Self {
        Self::from_query(Query::Role { role, name: None })
    }

    /// Form control labelled `label`
    pub fn label(label: impl Into<String>) -> Self {
        Self::from_query(Query::Label(label.into()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_query(Query::Text(text.into()))
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::from_query(Query::TestId(id.into()))
    }

    /// Match names and text exactly rather than by substring
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Keep only elements containing `text`
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.has_text = Some(text.into());
        self
    }

    /// Resolve inside `parent` instead of the whole page
    pub fn within(mut self, parent: Locator) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// First match only, for queries that may legitimately match several
    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }

    /// Playwright expression resolving this locator against `page`
    pub fn to_js(&self) -> String {
        let root = match &self.parent {
            Some(parent) => parent.to_js(),
            None => "page".to_string(),
        };

        let mut expr = match &self.query {
            Query::Role { role, name } => format!(
                "{}.getByRole({}{})",
                root,
                js_string(role.as_str()),
                js_options(name.as_deref(), self.exact)
            ),
            Query::Label(label) => format!(
                "{}.getByLabel({}{})",
                root,
                js_string(label),
                js_options(None, self.exact)
            ),
            Query::Text(text) => format!(
                "{}.getByText({}{})",
                root,
                js_string(text),
                js_options(None, self.exact)
            ),
            Query::TestId(id) => format!("{}.getByTestId({})", root, js_string(id)),
        };

        if let Some(text) = &self.has_text {
            expr.push_str(&format!(".filter({{ hasText: {} }})", js_string(text)));
        }
        if self.first {
            expr.push_str(".first()");
        }
        expr
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{} >> ", parent)?;
        }
        match &self.query {
            Query::Role { role, name: Some(name) } => write!(f, "{} \"{}\"", role.as_str(), name)?,
            Query::Role { role, name: None } => write!(f, "{}", role.as_str())?,
            Query::Label(label) => write!(f, "label \"{}\"", label)?,
            Query::Text(text) => write!(f, "text \"{}\"", text)?,
            Query::TestId(id) => write!(f, "test-id \"{}\"", id)?,
        }
        if let Some(text) = &self.has_text {
            write!(f, " with text \"{}\"", text)?;
        }
        Ok(())
    }
}

/// JSON string literal, which is also a valid JS string literal
pub(crate) fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn js_options(name: Option<&str>, exact: bool) -> String {
    let mut fields = Vec::new();
    if let Some(name) = name {
        fields.push(format!("name: {}", js_string(name)));
    }
    if exact {
        fields.push("exact: true".to_string());
    }
    if fields.is_empty() {
        String::new()
    } else {
        format!(", {{ {} }}", fields.join(", "))
    }
}
