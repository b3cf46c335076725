//! Ready-made element predicates.
//!
//! Any `Fn(&ElementRecord) -> bool` works wherever a predicate is expected;
//! these helpers just cover the common lookups.

use regex::Regex;

use crate::perception::types::ElementRecord;

/// Shareable predicate, e.g. for [`InspectOptions::search`](crate::perception::pipeline::InspectOptions::search).
pub type Predicate = std::sync::Arc<dyn Fn(&ElementRecord) -> bool + Send + Sync>;

pub fn name_is(name: impl Into<String>) -> impl Fn(&ElementRecord) -> bool + Clone + Send + Sync {
    let name = name.into();
    move |r| r.semantic_name() == name
}

pub fn class_is(class: impl Into<String>) -> impl Fn(&ElementRecord) -> bool + Clone + Send + Sync {
    let class = class.into();
    move |r| r.class_name() == class
}

/// Any extracted line contains `needle`.
pub fn text_contains(
    needle: impl Into<String>,
) -> impl Fn(&ElementRecord) -> bool + Clone + Send + Sync {
    let needle = needle.into();
    move |r| r.text_contains(&needle)
}

/// Any extracted line matches `re`.
pub fn text_matches(re: Regex) -> impl Fn(&ElementRecord) -> bool + Clone + Send + Sync {
    move |r| r.text_lines().iter().any(|l| re.is_match(l))
}

pub fn min_confidence(threshold: f32) -> impl Fn(&ElementRecord) -> bool + Clone + Send + Sync {
    move |r| r.confidence() >= threshold
}

/// `and` / `or` chaining for predicates that can cross threads.
pub trait PredicateExt: Fn(&ElementRecord) -> bool + Send + Sync + Sized {
    fn and<Q>(self, other: Q) -> impl Fn(&ElementRecord) -> bool + Send + Sync
    where
        Q: Fn(&ElementRecord) -> bool + Send + Sync,
    {
        move |r| self(r) && other(r)
    }

    fn or<Q>(self, other: Q) -> impl Fn(&ElementRecord) -> bool + Send + Sync
    where
        Q: Fn(&ElementRecord) -> bool + Send + Sync,
    {
        move |r| self(r) || other(r)
    }
}

impl<F> PredicateExt for F where F: Fn(&ElementRecord) -> bool + Send + Sync {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::BoundingBox;

    fn record(name: &str, text: &[&str], confidence: f32) -> ElementRecord {
        ElementRecord::new(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            name,
            "0",
            confidence,
            text.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn helpers_match_fields() {
        let r = record("channel-link", &["鬼畜", "更多"], 0.8);
        assert!(name_is("channel-link")(&r));
        assert!(!name_is("button")(&r));
        assert!(class_is("0")(&r));
        assert!(text_contains("鬼")(&r));
        assert!(text_matches(Regex::new("^更").unwrap())(&r));
        assert!(min_confidence(0.8)(&r));
        assert!(!min_confidence(0.81)(&r));
    }

    #[test]
    fn combinators_compose() {
        let both = name_is("channel-link").and(text_contains("鬼畜"));
        let either = name_is("button").or(text_contains("更多"));
        let r = record("channel-link", &["鬼畜"], 0.5);
        let s = record("channel-link", &["动画"], 0.5);
        assert!(both(&r));
        assert!(!both(&s));
        assert!(!either(&s));
        assert!(either(&record("button", &[], 0.5)));
    }
}
