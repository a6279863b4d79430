//! Acting principal

/// The identity performing a tagging operation
///
/// The engine asks exactly one question of it: whether it may create brand-new
/// tags in the default department.
pub trait Principal {
    fn id(&self) -> &str;

    fn has_elevated_tagging_right(&self) -> bool;
}

/// A principal with a fixed identity and permission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPrincipal {
    id: String,
    elevated: bool,
}

impl StaticPrincipal {
    pub fn new(id: impl Into<String>, elevated: bool) -> Self {
        Self {
            id: id.into(),
            elevated,
        }
    }

    pub fn regular(id: impl Into<String>) -> Self {
        Self::new(id, false)
    }

    pub fn elevated(id: impl Into<String>) -> Self {
        Self::new(id, true)
    }
}

impl Principal for StaticPrincipal {
    fn id(&self) -> &str {
        &self.id
    }

    fn has_elevated_tagging_right(&self) -> bool {
        self.elevated
    }
}
