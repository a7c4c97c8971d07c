//! Path-query syntax and tokenizer.
//!
//! A query is a separator-delimited list of tokens. Before resolution the
//! tokenizer rewrites the shorthand forms:
//!
//! - `name#key` / `name@key` → `name`, `#`, `key` (Parameters / Attributes)
//! - `name[3]` → `name`, `3` (positional index into a list)
//! - a leading separator anchors the query at the configuration root
//! - a token starting with the node-search separator restarts at the root

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{NodeKind, ReservedKind};

/// Characters and terms of the query language. Configurable through settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuerySyntax {
    pub separator: char,
    pub search_separator: char,
    pub wildcard: String,
    pub recursive_wildcard: String,
    pub parent: String,
    pub current: String,
    pub parameters_marker: char,
    pub attributes_marker: char,
    pub properties_marker: char,
    pub parameters_name: String,
    pub attributes_name: String,
    pub properties_name: String,
}

impl Default for QuerySyntax {
    fn default() -> Self {
        Self {
            separator: '/',
            search_separator: ':',
            wildcard: "*".into(),
            recursive_wildcard: "**".into(),
            parent: "..".into(),
            current: ".".into(),
            parameters_marker: '#',
            attributes_marker: '@',
            properties_marker: '$',
            parameters_name: "__parameters".into(),
            attributes_name: "__attributes".into(),
            properties_name: "__properties".into(),
        }
    }
}

impl QuerySyntax {
    pub fn reserved_name(&self, kind: ReservedKind) -> &str {
        match kind {
            ReservedKind::Parameters => &self.parameters_name,
            ReservedKind::Attributes => &self.attributes_name,
            ReservedKind::Properties => &self.properties_name,
        }
    }

    pub fn abbreviation(&self, kind: ReservedKind) -> char {
        match kind {
            ReservedKind::Parameters => self.parameters_marker,
            ReservedKind::Attributes => self.attributes_marker,
            ReservedKind::Properties => self.properties_marker,
        }
    }

    /// Reserved sub-node addressed by `token`, by literal name or abbreviation.
    pub fn reserved_for_token(&self, token: &str) -> Option<ReservedKind> {
        ReservedKind::ALL.into_iter().find(|&kind| {
            token == self.reserved_name(kind) || is_single(token, self.abbreviation(kind))
        })
    }

    pub fn is_wildcard(&self, token: &str) -> bool {
        token == self.wildcard
    }

    pub fn is_recursive_wildcard(&self, token: &str) -> bool {
        token == self.recursive_wildcard
    }

    pub fn is_parent(&self, token: &str) -> bool {
        token == self.parent
    }

    fn is_operator(&self, token: &str) -> bool {
        self.is_wildcard(token)
            || self.is_recursive_wildcard(token)
            || self.is_parent(token)
            || token == self.current
    }

    /// Rejects names that would break path computation or resolution.
    pub fn validate_name(&self, name: &str, kind: &NodeKind) -> DomainResult<()> {
        if name.is_empty() {
            return Err(DomainError::InvalidName {
                name: name.to_string(),
                reason: "empty name".to_string(),
            });
        }
        if kind.allows_free_name() {
            return Ok(());
        }
        for sep in [self.separator, self.search_separator] {
            if name.contains(sep) {
                return Err(DomainError::InvalidName {
                    name: name.to_string(),
                    reason: format!("contains reserved character '{}'", sep),
                });
            }
        }
        Ok(())
    }
}

fn is_single(token: &str, c: char) -> bool {
    let mut chars = token.chars();
    chars.next() == Some(c) && chars.next().is_none()
}

/// Where resolution of a query starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Start node; the first token has to name it (or be `.`).
    Current,
    /// Configuration root; the first token has to name the root.
    RootAbsolute,
    /// Configuration root; tokens address the root's descendants.
    RootRelative,
}

/// A tokenized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    pub anchor: Anchor,
    pub tokens: Vec<String>,
}

impl PathQuery {
    pub fn parse(query: &str, syntax: &QuerySyntax) -> DomainResult<Self> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(DomainError::malformed(query, "empty query"));
        }

        let mut anchor = Anchor::Current;
        let mut body = trimmed;
        if let Some(rest) = body.strip_prefix(syntax.separator) {
            anchor = Anchor::RootAbsolute;
            body = rest;
        }

        let mut raw: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split(syntax.separator).collect()
        };
        if raw.len() > 1 && raw.last() == Some(&"") {
            raw.pop();
        }

        if let Some(pos) = raw
            .iter()
            .rposition(|t| t.starts_with(syntax.search_separator))
        {
            anchor = Anchor::RootRelative;
            let head = &raw[pos][syntax.search_separator.len_utf8()..];
            let mut restarted = Vec::with_capacity(raw.len() - pos);
            if !head.is_empty() {
                restarted.push(head);
            }
            restarted.extend_from_slice(&raw[pos + 1..]);
            raw = restarted;
        }

        let mut tokens = Vec::with_capacity(raw.len());
        for (i, token) in raw.iter().enumerate() {
            if token.is_empty() {
                return Err(DomainError::malformed(query, "empty path segment"));
            }
            if *token == syntax.current && (i > 0 || anchor != Anchor::Current) {
                return Err(DomainError::malformed(
                    query,
                    format!("'{}' is only valid as the leading token", syntax.current),
                ));
            }
            tokens.extend(expand_token(token, syntax, query)?);
        }

        Ok(Self { anchor, tokens })
    }
}

fn expand_token(token: &str, syntax: &QuerySyntax, query: &str) -> DomainResult<Vec<String>> {
    if syntax.is_operator(token) || syntax.reserved_for_token(token).is_some() {
        return Ok(vec![token.to_string()]);
    }

    let markers = [syntax.parameters_marker, syntax.attributes_marker];
    if let Some(pos) = token.find(markers) {
        let (prefix, rest) = token.split_at(pos);
        let marker = &rest[..rest.chars().next().map_or(0, char::len_utf8)];
        let key = &rest[marker.len()..];
        if key.contains(markers) {
            return Err(DomainError::malformed(
                query,
                format!("more than one reserved marker in '{}'", token),
            ));
        }
        let mut out = Vec::new();
        if !prefix.is_empty() {
            out.extend(expand_index(prefix, query)?);
        }
        out.push(marker.to_string());
        if !key.is_empty() {
            out.extend(expand_index(key, query)?);
        }
        return Ok(out);
    }

    expand_index(token, query)
}

fn expand_index(token: &str, query: &str) -> DomainResult<Vec<String>> {
    let Some(open) = token.find('[') else {
        if token.contains(']') {
            return Err(DomainError::malformed(
                query,
                format!("unbalanced ']' in '{}'", token),
            ));
        }
        return Ok(vec![token.to_string()]);
    };

    let name = &token[..open];
    let inner = token[open + 1..].strip_suffix(']').ok_or_else(|| {
        DomainError::malformed(query, format!("unterminated index in '{}'", token))
    })?;
    if name.is_empty() {
        return Err(DomainError::malformed(
            query,
            format!("index without a list name in '{}'", token),
        ));
    }
    if inner.contains(['[', ']']) {
        return Err(DomainError::malformed(
            query,
            format!("nested index in '{}'", token),
        ));
    }
    let index: usize = inner.trim().parse().map_err(|_| {
        DomainError::malformed(query, format!("invalid list index '{}'", inner))
    })?;
    Ok(vec![name.to_string(), index.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(q: &str) -> DomainResult<PathQuery> {
        PathQuery::parse(q, &QuerySyntax::default())
    }

    #[test]
    fn test_plain_relative_query() {
        let q = parse("app/server/port").unwrap();
        assert_eq!(q.anchor, Anchor::Current);
        assert_eq!(q.tokens, vec!["app", "server", "port"]);
    }

    #[test]
    fn test_absolute_query_with_trailing_separator() {
        let q = parse("/app/server/").unwrap();
        assert_eq!(q.anchor, Anchor::RootAbsolute);
        assert_eq!(q.tokens, vec!["app", "server"]);
    }

    #[test]
    fn test_search_separator_restarts_at_root() {
        let q = parse("app/server/:db/host").unwrap();
        assert_eq!(q.anchor, Anchor::RootRelative);
        assert_eq!(q.tokens, vec!["db", "host"]);
    }

    #[test]
    fn test_marker_split() {
        let q = parse("app/server#port").unwrap();
        assert_eq!(q.tokens, vec!["app", "server", "#", "port"]);
        let q = parse("app/@id").unwrap();
        assert_eq!(q.tokens, vec!["app", "@", "id"]);
        let q = parse("app/server#").unwrap();
        assert_eq!(q.tokens, vec!["app", "server", "#"]);
    }

    #[test]
    fn test_reserved_literal_is_not_split() {
        let q = parse("app/__parameters/port").unwrap();
        assert_eq!(q.tokens, vec!["app", "__parameters", "port"]);
    }

    #[test]
    fn test_positional_index() {
        let q = parse("app/hosts[2]").unwrap();
        assert_eq!(q.tokens, vec!["app", "hosts", "2"]);
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(parse("app/hosts[x]").is_err());
        assert!(parse("app/hosts[1").is_err());
        assert!(parse("app/hosts]").is_err());
        assert!(parse("app/[1]").is_err());
        assert!(parse("app//port").is_err());
        assert!(parse("").is_err());
        assert!(parse("app/./port").is_err());
        assert!(parse("app/a#b#c").is_err());
    }

    #[test]
    fn test_validate_name() {
        let syntax = QuerySyntax::default();
        assert!(syntax.validate_name("server", &NodeKind::path()).is_ok());
        assert!(syntax.validate_name("a/b", &NodeKind::path()).is_err());
        assert!(syntax.validate_name("a:b", &NodeKind::list_values()).is_err());
        assert!(syntax.validate_name("a/b", &NodeKind::value("x")).is_ok());
        assert!(syntax.validate_name("", &NodeKind::value("x")).is_err());
    }
}
