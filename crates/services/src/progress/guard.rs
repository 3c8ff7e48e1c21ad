use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use course_core::model::{ExerciseId, LessonId, ModuleId, TestId};

/// Identity of a logical mutation, used to reject a repeat while one is pending.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ActionKey {
    Lesson(ModuleId, LessonId),
    Exercise(ModuleId, LessonId, ExerciseId),
    Test(ModuleId, TestId),
    Revision(ModuleId, TestId),
    Load,
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKey::Lesson(m, l) => write!(f, "lesson {m}/{l}"),
            ActionKey::Exercise(m, l, e) => write!(f, "exercise {m}/{l}/{e}"),
            ActionKey::Test(m, t) => write!(f, "test result {m}/{t}"),
            ActionKey::Revision(m, t) => write!(f, "revision {m}/{t}"),
            ActionKey::Load => f.write_str("progress load"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    keys: Mutex<HashSet<ActionKey>>,
}

impl InFlight {
    /// Claims `key`, or returns `None` if the same action is already pending.
    pub(crate) fn begin(&self, key: ActionKey) -> Option<InFlightGuard<'_>> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard { owner: self, key })
    }
}

/// Releases its key on drop, including when the owning future is cancelled.
pub(crate) struct InFlightGuard<'a> {
    owner: &'a InFlight,
    key: ActionKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let flight = InFlight::default();
        let key = ActionKey::Test(ModuleId::new("m"), TestId::new("t"));

        let guard = flight.begin(key.clone()).expect("first claim");
        assert!(flight.begin(key.clone()).is_none());
        assert!(flight.begin(ActionKey::Load).is_some());

        drop(guard);
        assert!(flight.begin(key).is_some());
    }
}
