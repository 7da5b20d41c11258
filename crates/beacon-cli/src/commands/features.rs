//! Features command

use std::io::Write;

use beacon_feature::FeatureRegistry;

use crate::Result;

pub fn run(out: &mut impl Write) -> Result<()> {
    let registry = FeatureRegistry::with_builtin_features()?;
    for id in registry.enumerate() {
        writeln!(out, "{id}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_builtin_features_sorted() {
        let mut out = Vec::new();
        run(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines.contains(&"clusterChecks"));
        assert!(lines.contains(&"npm"));
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }
}
