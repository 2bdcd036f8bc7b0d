// The per-person task scheduler.
//
// A `Scheduler` is a prioritized bag of pending tasks. Priorities are not
// stored here — they live in the person's priority table and are
// recomputed by the thinker every tick, so selection always reflects the
// current world. Ties break by insertion order (`seq`).
//
// One task kind appears at most once in the bag: the thinker re-offers
// every applicable kind each tick, so refusing duplicates keeps the bag
// bounded without changing which task runs next.
//
// `execute()` runs one round: drop tasks whose target structure vanished
// (cleaning up their worker registration), pick the highest-priority
// task, execute it once, and either retire it (finished, or a task-fatal
// error like `CapacityViolation`) or put it back for the next tick.
//
// **Critical constraint: determinism.** Selection scans the task list in
// insertion order and the priority table is deterministic, so the same
// state always runs the same task.

use crate::error::SimResult;
use crate::person::Person;
use crate::sim::TickCtx;
use crate::task::{self, Task, TaskKind, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scheduler {
    tasks: Vec<Task>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn contains_kind(&self, kind: TaskKind) -> bool {
        self.tasks.iter().any(|t| t.kind == kind)
    }

    /// Enqueue a task of `kind` unless one is already pending.
    pub fn add(&mut self, kind: TaskKind) {
        if self.contains_kind(kind) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(Task::new(kind, seq));
    }

    /// Index of the highest-priority task; ties go to the earliest seq.
    pub fn select_index(&self, priorities: &BTreeMap<TaskKind, i32>) -> Option<usize> {
        let mut best: Option<(usize, i32, u64)> = None;
        for (i, t) in self.tasks.iter().enumerate() {
            let p = priorities.get(&t.kind).copied().unwrap_or(1);
            let better = match best {
                None => true,
                Some((_, bp, bseq)) => p > bp || (p == bp && t.seq < bseq),
            };
            if better {
                best = Some((i, p, t.seq));
            }
        }
        best.map(|(i, _, _)| i)
    }

    pub fn take_at(&mut self, index: usize) -> Task {
        self.tasks.remove(index)
    }

    /// Put an unfinished task back; its original seq keeps ordering fair.
    pub fn push_back(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Drain every pending task (end-of-year flush, death).
    pub fn drain(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.tasks)
    }
}

/// Run one scheduler round for a person.
pub fn execute(person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<()> {
    // Tasks whose structure vanished are cleaned up and dropped first.
    let mut i = 0;
    while i < person.scheduler.tasks.len() {
        if person.scheduler.tasks[i].structure_vanished(ctx.grid) {
            let task = person.scheduler.tasks.remove(i);
            task.cleanup(ctx.grid, person.pk);
        } else {
            i += 1;
        }
    }

    let Some(index) = person.scheduler.select_index(&person.priorities) else {
        return Ok(());
    };
    let mut task = person.scheduler.take_at(index);

    match task::execute(&mut task, person, ctx) {
        Ok(TaskStatus::Finished) => {
            task.cleanup(ctx.grid, person.pk);
            Ok(())
        }
        Ok(TaskStatus::Pending) => {
            person.scheduler.push_back(task);
            Ok(())
        }
        Err(e) if e.is_task_fatal() => {
            // The task dies; the simulation continues.
            task.cleanup(ctx.grid, person.pk);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuildingKind, WorkKind};

    #[test]
    fn add_refuses_duplicate_kinds() {
        let mut s = Scheduler::new();
        s.add(TaskKind::Explore);
        s.add(TaskKind::Explore);
        s.add(TaskKind::Eat);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn selection_prefers_higher_priority() {
        let mut s = Scheduler::new();
        s.add(TaskKind::Explore);
        s.add(TaskKind::Eat);
        s.add(TaskKind::Transport);

        let mut priorities = BTreeMap::new();
        priorities.insert(TaskKind::Explore, 2);
        priorities.insert(TaskKind::Eat, 9);
        priorities.insert(TaskKind::Transport, 5);

        let idx = s.select_index(&priorities).unwrap();
        assert_eq!(s.tasks()[idx].kind, TaskKind::Eat);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut s = Scheduler::new();
        s.add(TaskKind::Work(WorkKind::Farm));
        s.add(TaskKind::Work(WorkKind::Mine));

        let mut priorities = BTreeMap::new();
        priorities.insert(TaskKind::Work(WorkKind::Farm), 5);
        priorities.insert(TaskKind::Work(WorkKind::Mine), 5);

        let idx = s.select_index(&priorities).unwrap();
        assert_eq!(s.tasks()[idx].kind, TaskKind::Work(WorkKind::Farm));
    }

    #[test]
    fn unknown_kinds_rank_lowest() {
        let mut s = Scheduler::new();
        s.add(TaskKind::StartConstruction(BuildingKind::Barn));
        s.add(TaskKind::Eat);

        let mut priorities = BTreeMap::new();
        priorities.insert(TaskKind::Eat, 2);
        // StartConstruction missing from the table: defaults to 1.

        let idx = s.select_index(&priorities).unwrap();
        assert_eq!(s.tasks()[idx].kind, TaskKind::Eat);
    }

    #[test]
    fn drain_empties_the_bag() {
        let mut s = Scheduler::new();
        s.add(TaskKind::Explore);
        s.add(TaskKind::Eat);
        let drained = s.drain();
        assert_eq!(drained.len(), 2);
        assert!(s.is_empty());
    }

    #[test]
    fn take_and_push_back_preserves_seq_ordering() {
        let mut s = Scheduler::new();
        s.add(TaskKind::Explore); // seq 0
        s.add(TaskKind::Eat); // seq 1

        let mut priorities = BTreeMap::new();
        priorities.insert(TaskKind::Explore, 5);
        priorities.insert(TaskKind::Eat, 5);

        let idx = s.select_index(&priorities).unwrap();
        let task = s.take_at(idx);
        assert_eq!(task.kind, TaskKind::Explore);
        s.push_back(task);

        // Explore kept seq 0, so it still wins the tie.
        let idx = s.select_index(&priorities).unwrap();
        assert_eq!(s.tasks()[idx].kind, TaskKind::Explore);
    }
}
