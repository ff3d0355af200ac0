use thiserror::Error;

/// Why a query template could not be turned into a [`QueryModel`].
///
/// Positions are byte offsets into the template; see [`line_column`] for a
/// human-readable location.
///
/// [`QueryModel`]: super::QueryModel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("subquery opened with '{{{{' is never closed")]
    UnterminatedSubquery { position: usize },

    #[error("unbalanced brace")]
    UnbalancedBrace { position: usize },

    #[error("unterminated string literal")]
    UnterminatedString { position: usize },

    #[error("invalid parameter placeholder")]
    InvalidParameter { position: usize },

    #[error("unexpected character '{found}'")]
    UnexpectedChar { found: char, position: usize },

    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found:    String,
        position: usize
    },

    #[error("expected {expected}, found end of query")]
    UnexpectedEnd { expected: String, position: usize },

    #[error("malformed IN list: {reason}")]
    MalformedInList { reason: String, position: usize },

    #[error("subquery nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize, position: usize },

    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String, position: usize },

    #[error("unknown alias '{alias}'")]
    UnknownAlias { alias: String, position: usize },

    #[error("alias '{alias}' is declared at more than one scope level")]
    AmbiguousAlias { alias: String, position: usize },

    #[error("alias '{alias}' is declared twice in the same FROM clause")]
    DuplicateAlias { alias: String, position: usize },

    #[error("column '{column}' has no alias and the scope has {sources} sources")]
    UnqualifiedColumn {
        column:   String,
        sources:  usize,
        position: usize
    },

    #[error("alias '{alias}' is declared for '{declared}' but the query uses '{found}'")]
    AliasMismatch {
        alias:    String,
        declared: String,
        found:    String,
        position: usize
    }
}

impl ParseError {
    pub fn position(&self) -> usize {
        match self {
            Self::UnterminatedSubquery { position }
            | Self::UnbalancedBrace { position }
            | Self::UnterminatedString { position }
            | Self::InvalidParameter { position }
            | Self::UnexpectedChar { position, .. }
            | Self::UnexpectedToken { position, .. }
            | Self::UnexpectedEnd { position, .. }
            | Self::MalformedInList { position, .. }
            | Self::DepthExceeded { position, .. }
            | Self::Unsupported { position, .. }
            | Self::UnknownAlias { position, .. }
            | Self::AmbiguousAlias { position, .. }
            | Self::DuplicateAlias { position, .. }
            | Self::UnqualifiedColumn { position, .. }
            | Self::AliasMismatch { position, .. } => *position
        }
    }

    /// Alias resolution failures, as opposed to malformed text.
    pub fn is_alias_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAlias { .. }
                | Self::AmbiguousAlias { .. }
                | Self::DuplicateAlias { .. }
                | Self::UnqualifiedColumn { .. }
                | Self::AliasMismatch { .. }
        )
    }
}

/// One-based line and column of a byte offset.
pub fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = text.get(..offset).unwrap_or(text);
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map(|nl| before[nl + 1..].chars().count())
        .unwrap_or_else(|| before.chars().count())
        + 1;
    (line, column)
}
