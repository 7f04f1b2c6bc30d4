use crate::models::LeakCategory;

/// Surface forms a detector may use for each category, after canonicalisation.
const LEAK_CLASS_ALIASES: &[(&str, LeakCategory)] = &[
    ("pipe_crack", LeakCategory::PipeCrack),
    ("crack", LeakCategory::PipeCrack),
    ("cracked_pipe", LeakCategory::PipeCrack),
    ("rust_corrosion", LeakCategory::RustCorrosion),
    ("corrosion", LeakCategory::RustCorrosion),
    ("rust", LeakCategory::RustCorrosion),
    ("joint_leakage", LeakCategory::JointLeakage),
    ("joint_leak", LeakCategory::JointLeakage),
    ("leaking_joint", LeakCategory::JointLeakage),
    ("burst_pipe", LeakCategory::BurstPipe),
    ("burst", LeakCategory::BurstPipe),
    ("pipe_burst", LeakCategory::BurstPipe),
];

/// Lower-case, with runs of whitespace, hyphens and underscores collapsed to one `_`.
fn canonical_key(raw_label: &str) -> String {
    raw_label
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Map a detector's class name onto a leak category.
///
/// `None` means the detection should be discarded, not that anything failed.
pub fn normalize(raw_label: &str) -> Option<LeakCategory> {
    let key = canonical_key(raw_label);
    LEAK_CLASS_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, category)| *category)
}

/// True when at least one label of a detector's vocabulary is a leak class.
/// A model trained on unrelated objects returns false.
pub fn supports_leak_classes<I, S>(label_set: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    label_set.into_iter().any(|label| normalize(label.as_ref()).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_forms_collapse() {
        for raw in ["Crack", "pipe_crack", "PIPE-CRACK", " Pipe  Crack ", "pipe - crack"] {
            assert_eq!(normalize(raw), Some(LeakCategory::PipeCrack), "{raw}");
        }
        assert_eq!(normalize("corrosion"), Some(LeakCategory::RustCorrosion));
        assert_eq!(normalize("Joint Leak"), Some(LeakCategory::JointLeakage));
        assert_eq!(normalize("burst"), Some(LeakCategory::BurstPipe));
    }

    #[test]
    fn unknown_labels_are_rejected() {
        assert_eq!(normalize("dog"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("No leak detected"), None);
    }

    #[test]
    fn every_box_category_has_two_aliases() {
        for category in LeakCategory::ALL.iter().filter(|c| **c != LeakCategory::NoLeak) {
            let count = LEAK_CLASS_ALIASES.iter().filter(|(_, c)| c == category).count();
            assert!(count >= 2, "{category}");
        }
    }

    #[test]
    fn leak_class_support() {
        assert!(supports_leak_classes(["person", "bicycle", "Burst Pipe"]));
        assert!(!supports_leak_classes(["person", "bicycle", "car"]));
        assert!(!supports_leak_classes(Vec::<String>::new()));
    }
}
