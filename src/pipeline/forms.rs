//! Form change requests.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static FIELD_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(?:input|textarea|select)[^>]*\bname\s*=\s*["']([^"']*)["']"#).unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    Contact,
    Newsletter,
    Signup,
    Custom,
}

impl FormType {
    pub fn default_fields(&self) -> Vec<FormField> {
        match self {
            FormType::Contact => vec![FormField::Name, FormField::Email, FormField::Message],
            FormType::Newsletter => vec![FormField::Email],
            FormType::Signup => vec![FormField::Name, FormField::Email, FormField::Phone],
            FormType::Custom => Vec::new(),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            FormType::Contact => "General contact form with name, email, message",
            FormType::Newsletter => "Simple email signup form",
            FormType::Signup => "Registration form with multiple user fields",
            FormType::Custom => "Custom field configuration",
        }
    }
}

impl std::fmt::Display for FormType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormType::Contact => write!(f, "contact"),
            FormType::Newsletter => write!(f, "newsletter"),
            FormType::Signup => write!(f, "signup"),
            FormType::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for FormType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contact" => Ok(FormType::Contact),
            "newsletter" => Ok(FormType::Newsletter),
            "signup" => Ok(FormType::Signup),
            "custom" => Ok(FormType::Custom),
            _ => anyhow::bail!(
                "Invalid form type '{}'. Valid values: contact, newsletter, signup, custom",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStyle {
    Inline,
    Modal,
    Sidebar,
    Fullpage,
}

impl FormStyle {
    pub fn describe(&self) -> &'static str {
        match self {
            FormStyle::Inline => "embedded directly in page sections",
            FormStyle::Modal => "popup modal overlay with click trigger",
            FormStyle::Sidebar => "fixed position sidebar form",
            FormStyle::Fullpage => "dedicated full-width form section",
        }
    }
}

impl std::fmt::Display for FormStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormStyle::Inline => write!(f, "inline"),
            FormStyle::Modal => write!(f, "modal"),
            FormStyle::Sidebar => write!(f, "sidebar"),
            FormStyle::Fullpage => write!(f, "fullpage"),
        }
    }
}

impl std::str::FromStr for FormStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inline" => Ok(FormStyle::Inline),
            "modal" => Ok(FormStyle::Modal),
            "sidebar" => Ok(FormStyle::Sidebar),
            "fullpage" => Ok(FormStyle::Fullpage),
            _ => anyhow::bail!(
                "Invalid form style '{}'. Valid values: inline, modal, sidebar, fullpage",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormField {
    Name,
    Email,
    Phone,
    Message,
    Company,
    Website,
    Subject,
}

impl std::fmt::Display for FormField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormField::Name => "name",
            FormField::Email => "email",
            FormField::Phone => "phone",
            FormField::Message => "message",
            FormField::Company => "company",
            FormField::Website => "website",
            FormField::Subject => "subject",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for FormField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(FormField::Name),
            "email" => Ok(FormField::Email),
            "phone" => Ok(FormField::Phone),
            "message" => Ok(FormField::Message),
            "company" => Ok(FormField::Company),
            "website" => Ok(FormField::Website),
            "subject" => Ok(FormField::Subject),
            _ => anyhow::bail!(
                "Invalid form field '{}'. Valid values: name, email, phone, message, company, website, subject",
                s
            ),
        }
    }
}

/// Parse a comma-separated field list, e.g. `name,email,message`.
pub fn parse_fields(list: &str) -> anyhow::Result<Vec<FormField>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// A requested change to the page's forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormChange {
    /// Add forms that match the current theme
    Add,
    /// Remove every form, keeping the rest of the layout
    Remove,
    /// Replace forms with a configured one
    Edit {
        form_type: FormType,
        /// Empty means the type's default fields
        fields: Vec<FormField>,
        style: Option<FormStyle>,
        cta: Option<String>,
    },
}

impl FormChange {
    /// Fields the edited form will carry.
    pub fn effective_fields(&self) -> Vec<FormField> {
        match self {
            FormChange::Edit {
                form_type, fields, ..
            } if fields.is_empty() => form_type.default_fields(),
            FormChange::Edit { fields, .. } => fields.clone(),
            _ => Vec::new(),
        }
    }

    /// Value of `include_forms` after the change succeeds.
    pub fn include_forms(&self) -> bool {
        !matches!(self, FormChange::Remove)
    }

    pub fn describe(&self) -> String {
        match self {
            FormChange::Add => "add forms".to_string(),
            FormChange::Remove => "remove forms".to_string(),
            FormChange::Edit {
                form_type, style, ..
            } => {
                let fields = self
                    .effective_fields()
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                match style {
                    Some(style) => format!("{} form ({}) as {}", form_type, fields, style),
                    None => format!("{} form ({})", form_type, fields),
                }
            }
        }
    }
}

/// Forms present in a page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormSummary {
    pub form_count: usize,
    pub fields: BTreeSet<String>,
}

impl FormSummary {
    pub fn has_forms(&self) -> bool {
        self.form_count > 0
    }
}

pub fn detect_forms(html: &str) -> FormSummary {
    FormSummary {
        form_count: html.to_lowercase().matches("<form").count(),
        fields: FIELD_NAME_REGEX
            .captures_iter(html)
            .map(|caps| caps[1].to_string())
            .filter(|name| !name.is_empty())
            .collect(),
    }
}
