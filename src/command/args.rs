//! Inbound operation parsing: the caller's principal reference and the raw
//! command string supplied by the transport layer.

use serde::Serialize;

use crate::error::GateError;

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// The identity on whose behalf an operation is requested.
///
/// Exactly one case is populated by construction; downstream code can never
/// observe an ambiguous "two identifiers set" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// An authorized-key identifier, as recorded by the authority.
    KeyId(String),
    /// A username known to the authority.
    Username(String),
    /// A numeric user identifier.
    UserId(u64),
}

impl Principal {
    /// Query-parameter form, for GET endpoints.
    pub fn query_param(&self) -> (&'static str, String) {
        match self {
            Principal::KeyId(id) => ("key_id", id.clone()),
            Principal::Username(name) => ("username", name.clone()),
            Principal::UserId(id) => ("user_id", id.to_string()),
        }
    }
}

/// JSON body form of a [`Principal`].  The absent identifier fields are
/// omitted from the envelope entirely, never zero-valued, so the authority
/// cannot misread an unset field as a real identifier.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PrincipalEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

impl PrincipalEnvelope {
    pub fn from_user_id(user_id: u64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

impl From<&Principal> for PrincipalEnvelope {
    fn from(principal: &Principal) -> Self {
        match principal {
            Principal::KeyId(id) => Self {
                key_id: Some(id.clone()),
                ..Self::default()
            },
            Principal::Username(name) => Self {
                username: Some(name.clone()),
                ..Self::default()
            },
            Principal::UserId(id) => Self::from_user_id(*id),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation descriptor
// ---------------------------------------------------------------------------

/// One requested operation: its name plus the full raw argument vector
/// (the name is `args[0]`, mirroring an exec-style argv).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse the raw command string into an [`OperationRequest`].
///
/// An empty or whitespace-only command is rejected before any network call
/// is made.
pub fn parse_command(raw: &str) -> Result<OperationRequest, GateError> {
    let args = split_words(raw);
    match args.first() {
        Some(name) => Ok(OperationRequest {
            name: name.clone(),
            args,
        }),
        None => Err(GateError::disallowed_command()),
    }
}

/// Split a command string into words, honouring single quotes, double
/// quotes, and backslash escapes outside single quotes.
///
/// Handles the forms Git clients actually send, e.g.
/// `git-upload-archive 'group/project.git'`.
fn split_words(raw: &str) -> Vec<String> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_word = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if in_word {
        words.push(current);
    }

    words
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ── Word splitting ──────────────────────────────────────────────────

    #[test]
    fn splits_plain_words() {
        assert_eq!(
            split_words("git-upload-archive group/repo"),
            vec!["git-upload-archive", "group/repo"]
        );
    }

    #[test]
    fn strips_single_quotes() {
        assert_eq!(
            split_words("git-upload-archive 'group/repo.git'"),
            vec!["git-upload-archive", "group/repo.git"]
        );
    }

    #[test]
    fn strips_double_quotes_and_keeps_spaces() {
        assert_eq!(
            split_words("personal-access-token \"my token\" api"),
            vec!["personal-access-token", "my token", "api"]
        );
    }

    #[test]
    fn backslash_escapes_a_space() {
        assert_eq!(split_words("a\\ b c"), vec!["a b", "c"]);
    }

    #[test]
    fn collapses_runs_of_whitespace() {
        assert_eq!(split_words("  discover   "), vec!["discover"]);
    }

    #[test]
    fn empty_string_yields_no_words() {
        assert!(split_words("").is_empty());
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn empty_quotes_yield_an_empty_word() {
        assert_eq!(split_words("cmd ''"), vec!["cmd", ""]);
    }

    // ── Command parsing ─────────────────────────────────────────────────

    #[test]
    fn parse_command_keeps_name_as_first_arg() {
        let op = parse_command("git-upload-archive 'group/repo.git'").unwrap();
        assert_eq!(op.name, "git-upload-archive");
        assert_eq!(op.args, vec!["git-upload-archive", "group/repo.git"]);
    }

    #[test]
    fn parse_command_rejects_empty_input() {
        let err = parse_command("").unwrap_err();
        assert_eq!(err.to_string(), "Disallowed command");
    }

    // ── Principal envelopes ─────────────────────────────────────────────

    #[test]
    fn envelope_omits_unset_fields() {
        let envelope = PrincipalEnvelope::from(&Principal::KeyId("0".to_string()));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, serde_json::json!({"key_id": "0"}));
    }

    #[test]
    fn envelope_for_user_id() {
        let envelope = PrincipalEnvelope::from(&Principal::UserId(42));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, serde_json::json!({"user_id": 42}));
    }

    #[test]
    fn query_param_per_variant() {
        assert_eq!(
            Principal::KeyId("7".to_string()).query_param(),
            ("key_id", "7".to_string())
        );
        assert_eq!(
            Principal::Username("jane".to_string()).query_param(),
            ("username", "jane".to_string())
        );
        assert_eq!(
            Principal::UserId(3).query_param(),
            ("user_id", "3".to_string())
        );
    }
}
