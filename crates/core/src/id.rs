//! Opaque server-assigned identifiers.

/// Define a newtype id wrapped around a `String`, prefixed by a short type tag.
///
/// Generates `new()` for random generation, `from_string()` for parsing, `Display`,
/// `From<String>`/`From<&str>`, and `Borrow<str>` so the type can key a `HashMap<_, _>`
/// and be looked up by `&str` without allocating.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random id with the type prefix.
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(21)))
            }

            /// Wrap an existing string (parsing / deserialization from disk or wire).
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifies a project. Unique forever, never reused after `project_delete`.
    pub struct ProjectId("proj-");
}

define_id! {
    /// Identifies one live client connection.
    pub struct SessionId("sess-");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
