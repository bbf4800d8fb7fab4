// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Global allocation selection.
//!
//! In unlimited mode (the default) every variant simply receives its
//! minimum-value candidate. In capacity-limited mode a greedy pass hands
//! out allocations in order of priority and regret: variants that lose the
//! most by missing their top choice go first, and a variant whose choice
//! does not fit falls back to its next candidate and re-enters the queue.
//! Whatever demand is left after the greedy pass is handled by the
//! saturated-allocation policy.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use parse_display::{Display, FromStr};
use swell_common::model::{SystemSnapshot, VariantServer};

use crate::candidate::{generate_candidate, Candidate, CandidateOptions};

/// How remaining capacity is distributed once SLO-satisfying placements
/// are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, FromStr)]
pub enum SaturationPolicy {
    /// No further placement.
    #[default]
    None,
    /// In priority order, give each unallocated variant as many replicas
    /// of its top candidate as capacity still supports.
    PriorityExhaustive,
    /// Partition by priority, then hand out one replica at a time within
    /// each group.
    PriorityRoundRobin,
    /// One replica at a time across all unallocated variants.
    RoundRobin,
}

#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    /// Skip capacity constraints entirely and pick each variant's
    /// minimum-value candidate.
    pub unlimited: bool,
    /// Run a single global greedy pass instead of one pass per priority
    /// group.
    pub delayed_best_effort: bool,
    pub saturation_policy: SaturationPolicy,
    pub candidate: CandidateOptions,
}

impl SolverOptions {
    pub fn unlimited() -> Self {
        Self {
            unlimited: true,
            ..Default::default()
        }
    }
}

/// One allocation per variant, plus the variants no candidate fit.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub assignments: BTreeMap<String, Candidate>,
    pub unallocated: Vec<String>,
}

struct Entry {
    name: String,
    priority: u32,
    /// Sorted ascending by value.
    candidates: Vec<Candidate>,
    /// Index of the candidate currently under consideration.
    cur: usize,
}

impl Entry {
    fn current(&self) -> &Candidate {
        &self.candidates[self.cur]
    }

    /// Regret for not getting the current choice: the value gap to the
    /// next-best candidate, infinite when this is the last one.
    fn delta(&self) -> f64 {
        match self.candidates.get(self.cur + 1) {
            Some(next) => next.value - self.current().value,
            None => f64::INFINITY,
        }
    }
}

/// Queue order: highest priority first, then biggest regret, then most
/// costly-to-replace choice, then stable by name.
fn entry_order(a: &Entry, b: &Entry) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.delta().total_cmp(&a.delta()))
        .then_with(|| b.current().value.total_cmp(&a.current().value))
        .then_with(|| a.name.cmp(&b.name))
}

/// Candidate order within a variant: cheapest value first, ties broken by
/// cost, then by accelerator name for stability.
fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.value
        .total_cmp(&b.value)
        .then_with(|| a.alloc.cost.total_cmp(&b.alloc.cost))
        .then_with(|| a.alloc.accelerator.cmp(&b.alloc.accelerator))
}

/// Enumerate the sorted candidate allocations of one variant.
fn candidates_for(
    server: &VariantServer,
    snapshot: &SystemSnapshot,
    opts: &CandidateOptions,
) -> Vec<Candidate> {
    let mut candidates: Vec<_> = server
        .profiles
        .iter()
        .filter_map(|profile| {
            let accelerator = snapshot.accelerator(&profile.accelerator)?;
            generate_candidate(server, accelerator, profile, opts)
        })
        .collect();
    candidates.sort_by(candidate_order);
    candidates
}

/// Select at most one allocation per variant.
pub fn solve(snapshot: &SystemSnapshot, opts: &SolverOptions) -> Placement {
    if opts.unlimited {
        return solve_unlimited(snapshot, opts);
    }
    solve_limited(snapshot, opts)
}

/// Unlimited mode: argmin-value per variant, O(V) solver calls.
fn solve_unlimited(snapshot: &SystemSnapshot, opts: &SolverOptions) -> Placement {
    let mut placement = Placement::default();
    for (name, server) in &snapshot.servers {
        let candidates = candidates_for(server, snapshot, &opts.candidate);
        match candidates.into_iter().next() {
            Some(best) => {
                placement.assignments.insert(name.clone(), best);
            }
            None => placement.unallocated.push(name.clone()),
        }
    }
    placement
}

fn solve_limited(snapshot: &SystemSnapshot, opts: &SolverOptions) -> Placement {
    let mut capacity = snapshot.capacity.clone();
    let mut entries: Vec<Entry> = snapshot
        .servers
        .iter()
        .map(|(name, server)| Entry {
            name: name.clone(),
            priority: server.priority,
            candidates: candidates_for(server, snapshot, &opts.candidate),
            cur: 0,
        })
        .collect();
    entries.sort_by(entry_order);

    let mut placement = Placement::default();
    if opts.delayed_best_effort {
        let leftovers = greedy(entries, &mut capacity, &mut placement);
        saturate(leftovers, &mut capacity, &mut placement, opts.saturation_policy);
    } else {
        // One greedy-plus-saturation round per priority group.
        for (_, group) in &entries.into_iter().chunk_by(|e| e.priority) {
            let leftovers = greedy(group.collect(), &mut capacity, &mut placement);
            saturate(leftovers, &mut capacity, &mut placement, opts.saturation_policy);
        }
    }
    placement.unallocated.sort();
    placement
}

/// Greedy delta-value pass. `entries` must already be sorted by
/// [`entry_order`]. Returns the entries that could not be placed.
fn greedy(
    mut entries: Vec<Entry>,
    capacity: &mut HashMap<String, u32>,
    placement: &mut Placement,
) -> Vec<Entry> {
    let mut leftovers = Vec::new();
    while !entries.is_empty() {
        let mut entry = entries.remove(0);
        if entry.candidates.is_empty() {
            leftovers.push(entry);
            continue;
        }

        let candidate = entry.current();
        let units = candidate.units();
        let available = capacity.get(candidate.accelerator()).copied().unwrap_or(0);
        if units <= available {
            if units > 0 {
                *capacity.get_mut(candidate.accelerator()).unwrap() = available - units;
            }
            let candidate = entry.candidates.swap_remove(entry.cur);
            placement.assignments.insert(entry.name, candidate);
            continue;
        }

        if entry.cur + 1 < entry.candidates.len() {
            // Fall back to the next-best candidate and re-enter the queue
            // at the position the new delta dictates.
            entry.cur += 1;
            let at = entries.partition_point(|e| entry_order(e, &entry) == Ordering::Less);
            entries.insert(at, entry);
        } else {
            leftovers.push(entry);
        }
    }
    leftovers
}

/// Distribute remaining capacity over the unallocated entries.
fn saturate(
    leftovers: Vec<Entry>,
    capacity: &mut HashMap<String, u32>,
    placement: &mut Placement,
    policy: SaturationPolicy,
) {
    // Entries with no candidate at all stay unallocated regardless of the
    // policy.
    let (empty, mut leftovers): (Vec<_>, Vec<_>) = leftovers
        .into_iter()
        .partition(|e| e.candidates.is_empty());
    for entry in empty {
        placement.unallocated.push(entry.name);
    }

    let mut settle = |entry: Entry, granted: u32, placement: &mut Placement| {
        let mut candidate = entry.candidates.into_iter().next().unwrap();
        if granted == 0 {
            placement.unallocated.push(entry.name);
            return;
        }
        let requested = candidate.alloc.num_replicas.max(1) as f64;
        let ratio = granted as f64 / requested;
        candidate.alloc.num_replicas = granted;
        candidate.alloc.cost *= ratio;
        candidate.value *= ratio;
        placement.assignments.insert(entry.name, candidate);
    };

    match policy {
        SaturationPolicy::None => {
            for entry in leftovers {
                placement.unallocated.push(entry.name);
            }
        }
        SaturationPolicy::PriorityExhaustive => {
            leftovers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
            for mut entry in leftovers {
                entry.cur = 0;
                let candidate = entry.current();
                let units = candidate.units_per_replica.max(1);
                let available = capacity.get(candidate.accelerator()).copied().unwrap_or(0);
                let granted = (available / units).min(candidate.alloc.num_replicas);
                if granted > 0 {
                    *capacity.get_mut(candidate.accelerator()).unwrap() =
                        available - granted * units;
                }
                settle(entry, granted, placement);
            }
        }
        SaturationPolicy::PriorityRoundRobin => {
            leftovers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
            for (_, group) in &leftovers.into_iter().chunk_by(|e| e.priority) {
                round_robin(group.collect(), capacity, placement, &mut settle);
            }
        }
        SaturationPolicy::RoundRobin => {
            leftovers.sort_by(|a, b| a.name.cmp(&b.name));
            round_robin(leftovers, capacity, placement, &mut settle);
        }
    }
}

/// Hand out one replica at a time until every entry is satisfied or its
/// accelerator type is exhausted.
fn round_robin(
    mut entries: Vec<Entry>,
    capacity: &mut HashMap<String, u32>,
    placement: &mut Placement,
    settle: &mut impl FnMut(Entry, u32, &mut Placement),
) {
    for entry in &mut entries {
        entry.cur = 0;
    }
    let mut granted = vec![0u32; entries.len()];
    let mut done = vec![false; entries.len()];
    while !done.iter().all(|d| *d) {
        for i in 0..entries.len() {
            if done[i] {
                continue;
            }
            let candidate = entries[i].current();
            let units = candidate.units_per_replica.max(1);
            let available = capacity.get(candidate.accelerator()).copied().unwrap_or(0);
            if granted[i] >= candidate.alloc.num_replicas || available < units {
                done[i] = true;
                continue;
            }
            *capacity.get_mut(candidate.accelerator()).unwrap() = available - units;
            granted[i] += 1;
        }
    }
    for (entry, granted) in entries.into_iter().zip(granted) {
        settle(entry, granted, placement);
    }
}
