use crate::diff::ChangeKind;

/// How one physical occurrence of a document relates to the two commits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlag {
    /// The occurrence's segment core is shared by both commits
    pub intersection: bool,
    /// Written with a real comparison key, not an ignored one
    pub relevant: bool,
    pub live_in_source: bool,
    pub live_in_target: bool,
}

impl ChangeFlag {
    /// Occurrence in a segment only the target has (or rewrote)
    pub fn is_difference(&self) -> bool {
        !self.intersection
    }
}

/// Which kinds of occurrences a document's history holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryShape {
    /// Every occurrence is in a target-only segment
    NoIntersection,
    /// Every occurrence is in a shared segment
    NoDifference,
    Mixed,
}

impl HistoryShape {
    /// `None` for an empty history
    pub fn of(history: &[ChangeFlag]) -> Option<Self> {
        if history.is_empty() {
            return None;
        }
        let differences = history.iter().filter(|f| f.is_difference()).count();
        Some(if differences == history.len() {
            HistoryShape::NoIntersection
        } else if differences == 0 {
            HistoryShape::NoDifference
        } else {
            HistoryShape::Mixed
        })
    }
}

/// Classify the occurrence history of one document.
///
/// The history is in target segment order, so the last flag is the most
/// recent physical write. Returns `None` when the document did not change in
/// any way a diff reports.
pub fn classify(history: &[ChangeFlag]) -> Option<ChangeKind> {
    let last = history.last()?;
    let any_relevant = history.iter().any(|f| f.relevant);

    match HistoryShape::of(history)? {
        HistoryShape::NoIntersection => {
            (any_relevant && last.live_in_target).then_some(ChangeKind::New)
        }
        HistoryShape::NoDifference => {
            (any_relevant && !last.live_in_target && last.live_in_source)
                .then_some(ChangeKind::Detached)
        }
        HistoryShape::Mixed => {
            let first_change = history
                .iter()
                .find(|f| f.is_difference() && f.relevant)
                .map(|_| {
                    if last.live_in_target {
                        ChangeKind::Changed
                    } else {
                        ChangeKind::Detached
                    }
                });

            // A trailing delete in the target turns any relevant earlier
            // occurrence into a removal
            let deleted_last = history
                .iter()
                .rev()
                .find(|f| f.is_difference())
                .is_some_and(|f| !f.live_in_target);
            let detached = deleted_last
                && history
                    .iter()
                    .rev()
                    .any(|f| f.relevant && (f.live_in_source || !f.live_in_target));

            if detached {
                Some(ChangeKind::Detached)
            } else {
                first_change
            }
        }
    }
}
