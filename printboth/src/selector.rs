use crate::element::DomElement;

/// Represents ways to match a document element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by lowercase tag name (`button`, `s-internal-button`, ...)
    Tag(String),
    /// Select by element id
    Id(String),
    /// Any of the inner selectors matches
    Or(Vec<Selector>),
}

impl Selector {
    /// Matches any element whose tag is one of `tags`.
    pub fn any_tag<S: AsRef<str>>(tags: &[S]) -> Selector {
        let mut parts: Vec<Selector> = tags
            .iter()
            .map(|t| Selector::Tag(t.as_ref().to_lowercase()))
            .collect();
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Selector::Or(parts)
        }
    }

    pub fn matches(&self, element: &DomElement) -> bool {
        match self {
            Selector::Tag(tag) => element.tag().eq_ignore_ascii_case(tag),
            Selector::Id(id) => element.id().as_deref() == Some(id.as_str()),
            Selector::Or(inner) => inner.iter().any(|s| s.matches(element)),
        }
    }
}
