use regex::Regex;
use std::sync::LazyLock;

/// Document-native numbered name: `"<base> <n>"`.
static NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*\S)\s+(\d+)$").unwrap());

/// Split a name into its base and numeric suffix. A bare name has no suffix.
pub fn parse_suffix(name: &str) -> (&str, Option<u32>) {
    let name = name.trim();
    if let Some(caps) = NUMBERED.captures(name)
        && let (Some(base), Some(n)) = (caps.get(1), caps.get(2))
        && let Ok(n) = n.as_str().parse::<u32>()
    {
        return (base.as_str(), Some(n));
    }
    (name, None)
}

/// Names in a scope compare case-insensitively, ignoring surrounding blanks.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Base name for a new entity: explicit name, else the template's name with
/// its numeric suffix dropped, else the kind default.
pub fn base_name<'a>(
    explicit: Option<&'a str>,
    template: Option<&'a str>,
    default: &'a str,
) -> &'a str {
    if let Some(name) = explicit.map(str::trim).filter(|n| !n.is_empty()) {
        return name;
    }
    if let Some(name) = template.map(str::trim).filter(|n| !n.is_empty()) {
        return parse_suffix(name).0;
    }
    default
}

fn formatted(base: &str, n: u32) -> String {
    if n <= 1 {
        base.to_string()
    } else {
        format!("{base} {n}")
    }
}

/// Resolve a collision-free name for `base`.
///
/// `existing` must not include the entity being named. `previous` is the
/// slot's current name: it is kept as long as it still belongs to `base`
/// and nobody else took it, so renumbering never ripples across siblings.
/// Otherwise the bare base wins if free, then `"<base> 2"`, `"<base> 3"`...
pub fn resolve<S: AsRef<str>>(base: &str, existing: &[S], previous: Option<&str>) -> String {
    let base = base.trim();
    let taken = |candidate: &str| existing.iter().any(|e| names_equal(e.as_ref(), candidate));

    if let Some(previous) = previous {
        let (prefix, _) = parse_suffix(previous);
        if (names_equal(previous, base) || names_equal(prefix, base)) && !taken(previous) {
            return previous.trim().to_string();
        }
    }

    // the bare name counts as number 1
    let mut n = 1;
    loop {
        let candidate = formatted(base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_suffix() {
        assert_eq!(parse_suffix("Grid 12"), ("Grid", Some(12)));
        assert_eq!(parse_suffix("Grid"), ("Grid", None));
        assert_eq!(parse_suffix("Level 1 East"), ("Level 1 East", None));
        assert_eq!(parse_suffix("42"), ("42", None));
    }

    #[test]
    fn test_first_free_suffix() {
        let none: [&str; 0] = [];
        assert_eq!(resolve("Grid", &none, None), "Grid");
        assert_eq!(resolve("Grid", &["Grid"], None), "Grid 2");
        assert_eq!(resolve("Grid", &["Grid", "Grid 2"], None), "Grid 3");
        assert_eq!(resolve("Grid", &["Grid 2"], None), "Grid");
        assert_eq!(resolve("Grid", &["Grid", "Grid 3"], None), "Grid 2");
    }

    #[test]
    fn test_case_insensitive_collision() {
        assert_eq!(resolve("Grid", &["grid"], None), "Grid 2");
    }

    #[test]
    fn test_previous_name_is_stable() {
        assert_eq!(resolve("Grid", &["Grid"], Some("Grid 2")), "Grid 2");
        // freeing "Grid" does not renumber an existing slot
        let none: [&str; 0] = [];
        assert_eq!(resolve("Grid", &none, Some("Grid 2")), "Grid 2");
    }

    #[test]
    fn test_previous_name_dropped_when_base_changes() {
        let none: [&str; 0] = [];
        assert_eq!(resolve("Axis", &none, Some("Grid 2")), "Axis");
    }

    #[test]
    fn test_previous_name_taken_by_sibling() {
        assert_eq!(resolve("Grid", &["Grid 2", "Grid"], Some("Grid 2")), "Grid 3");
    }

    #[test]
    fn test_base_name_sources() {
        assert_eq!(base_name(Some("North"), Some("Floor 3"), "Floor"), "North");
        assert_eq!(base_name(None, Some("Slab 3"), "Floor"), "Slab");
        assert_eq!(base_name(Some("  "), None, "Floor"), "Floor");
    }

    proptest! {
        #[test]
        fn test_resolved_name_never_collides(
            taken in proptest::collection::btree_set(1u32..20, 0..15),
        ) {
            let existing: Vec<String> = taken.iter().map(|n| formatted("Grid", *n)).collect();
            let name = resolve("Grid", &existing, None);
            prop_assert!(!existing.iter().any(|e| names_equal(e, &name)));

            let expected = (1u32..).find(|n| !taken.contains(n)).unwrap();
            prop_assert_eq!(name, formatted("Grid", expected));
        }

        #[test]
        fn test_resolve_is_deterministic(
            taken in proptest::collection::vec("[A-C][a-c]{0,2}( [1-4])?", 0..10),
        ) {
            prop_assert_eq!(resolve("Ab", &taken, None), resolve("Ab", &taken, None));
        }
    }
}
