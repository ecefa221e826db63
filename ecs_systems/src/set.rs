//! System sets: named groups systems can be registered into, with `before`/`after` ordering
//! declared between sets rather than between individual systems (`spec.md` §4.1 `AddSystemToSet`/
//! `AddSetRunsBefore`/`AddSetRunsAfter`). Expanded into per-system edges by
//! [`crate::schedule::ScheduleBuilder::build`]. Grounded on the teacher's `SystemBuilder`
//! `explicit_deps: Vec<String>` field (`examples/0x112233-legion/src/system.rs`), generalized from
//! a name-to-system dependency to a name-to-set-of-systems one.

use fxhash::FxHashMap;

/// Name identifying a [`crate::system::SystemStorage`]'s membership in a group. Sets are created
/// implicitly on first reference — there is no separate `RegisterSet` operation.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct SetId(pub String);

impl From<&str> for SetId {
    fn from(value: &str) -> Self {
        SetId(value.to_string())
    }
}

impl From<String> for SetId {
    fn from(value: String) -> Self {
        SetId(value)
    }
}

/// Registry of set membership and set-level ordering, owned by
/// [`crate::schedule::ScheduleBuilder`] and consumed once at `build()` time.
#[derive(Default)]
pub struct SetRegistry {
    members: FxHashMap<SetId, Vec<usize>>,
    runs_before: Vec<(SetId, SetId)>,
}

impl SetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_system_to_set(&mut self, system_index: usize, set: impl Into<SetId>) {
        self.members.entry(set.into()).or_default().push(system_index);
    }

    /// Every system in `before_set` must run before every system in `after_set`.
    pub fn set_runs_before(&mut self, before_set: impl Into<SetId>, after_set: impl Into<SetId>) {
        self.runs_before.push((before_set.into(), after_set.into()));
    }

    pub fn set_runs_after(&mut self, after_set: impl Into<SetId>, before_set: impl Into<SetId>) {
        self.set_runs_before(before_set, after_set);
    }

    /// Expands every declared set-level ordering into the full cross product of per-system edges
    /// `(a, b)` meaning "a must run before b".
    pub fn expand_edges(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for (before_set, after_set) in &self.runs_before {
            let befores = self.members.get(before_set).map(Vec::as_slice).unwrap_or(&[]);
            let afters = self.members.get(after_set).map(Vec::as_slice).unwrap_or(&[]);
            edges.extend(itertools::iproduct!(befores.iter().copied(), afters.iter().copied()).filter(|(a, b)| a != b));
        }
        edges
    }
}
