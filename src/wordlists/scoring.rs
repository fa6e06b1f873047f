use super::SizeClass;
use super::catalog::{Candidate, tokenize};
use crate::config::types::ScoringWeights;
use crate::core::context::TargetContext;
use std::cmp::Ordering;
use std::path::Path;

/// Multiplier in `(0, 1]` that peaks at `peak` and decays per size class of distance.
pub fn size_fit(class: SizeClass, peak: SizeClass, decay: f64) -> f64 {
    let distance = (class.rank() - peak.rank()).unsigned_abs();
    decay.powi(distance as i32)
}

/// Number of confident technologies whose tag appears as a token of the
/// root-relative path. Multi-part tags need every part present.
pub fn context_matches(candidate: &Candidate, ctx: &TargetContext, floor: f64) -> usize {
    let tokens = tokenize(&candidate.relative);
    ctx.confident_technologies(floor)
        .into_iter()
        .filter(|(tag, _)| {
            let parts = tokenize(Path::new(tag));
            !parts.is_empty() && parts.iter().all(|p| tokens.contains(p))
        })
        .count()
}

pub fn score(
    candidate: &Candidate,
    root_priority: f64,
    ctx: &TargetContext,
    peak: SizeClass,
    weights: &ScoringWeights,
) -> f64 {
    let base = root_priority + size_fit(candidate.size_class, peak, weights.size_decay);
    let bonus = weights.context_bonus
        * context_matches(candidate, ctx, weights.confidence_floor) as f64;
    base + bonus
}

/// Score descending, then fewer estimated lines, then path.
pub fn rank_order(a: (&Candidate, f64), b: (&Candidate, f64)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| a.0.estimated_lines.cmp(&b.0.estimated_lines))
        .then_with(|| a.0.path.cmp(&b.0.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ContextUpdate;
    use crate::wordlists::Category;
    use rstest::rstest;
    use std::path::PathBuf;

    fn candidate(relative: &str) -> Candidate {
        Candidate {
            path: PathBuf::from("/lists").join(relative),
            relative: PathBuf::from(relative),
            category: Category::Directory,
            size_class: SizeClass::Small,
            estimated_lines: 100,
            source_root: 0,
        }
    }

    fn context_with(tags: &[&str]) -> TargetContext {
        let mut ctx = TargetContext::new("10.0.0.1");
        let mut update = ContextUpdate::default();
        for tag in tags {
            update.add_technology(tag, 0.9);
        }
        ctx.merge(update);
        ctx
    }

    #[rstest]
    #[case("cms/wordpress-plugins.txt", &["wordpress"], 1)]
    #[case("Discovery/Web-Content/google-dorks.txt", &["go"], 0)]
    #[case("Discovery/Web-Content/golang/go-routes.txt", &["go"], 1)]
    #[case("web/apache-tomcat.txt", &["apache", "tomcat", "nginx"], 2)]
    #[case("web/common.txt", &["php"], 0)]
    fn test_context_matches_whole_tokens(
        #[case] relative: &str,
        #[case] tags: &[&str],
        #[case] expected: usize,
    ) {
        assert_eq!(context_matches(&candidate(relative), &context_with(tags), 0.5), expected);
    }

    #[rstest]
    #[case(SizeClass::Medium, SizeClass::Medium, 1.0)]
    #[case(SizeClass::Small, SizeClass::Medium, 0.6)]
    #[case(SizeClass::Large, SizeClass::Medium, 0.6)]
    #[case(SizeClass::Large, SizeClass::Small, 0.36)]
    fn test_size_fit(#[case] class: SizeClass, #[case] peak: SizeClass, #[case] expected: f64) {
        assert!((size_fit(class, peak, 0.6) - expected).abs() < 1e-9);
    }
}
