//! Per-run name deduplication.

use std::collections::HashMap;

/// Hands out unique names by suffixing a per-base-name counter:
/// `fill` → `fill_0`, `fill_1`, ...
#[derive(Debug, Default, Clone)]
pub struct NameResolver {
    counters: HashMap<String, u32>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, name: &str) -> String {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        let resolved = format!("{}_{}", name, counter);
        *counter += 1;
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_count_per_name() {
        let mut names = NameResolver::new();
        assert_eq!(names.resolve("fill"), "fill_0");
        assert_eq!(names.resolve("check"), "check_0");
        assert_eq!(names.resolve("fill"), "fill_1");
        assert_eq!(names.resolve("fill"), "fill_2");
    }
}
