// ==============================================================================
// race.rs - LAP COUNTING, FINISH DETECTION, RESULTS REGISTRY
// ------------------------------------------------------------------------------
// One RaceSession per race. It owns:
//   - the race clock (simulated seconds since session start)
//   - a single RaceProgressTracker for every entered vehicle
//   - the append-only RaceResultsRegistry
//
// Per vehicle: Racing --(laps reach lap_target)--> Finished (terminal).
// A Finished vehicle ignores further finish-line crossings; the registry
// rejects a second record for the same vehicle outright.
//
// Mutation goes through `&mut self`, so the borrow checker serialises event
// dispatch. A multi-threaded host must wrap the session in a mutex.
// ==============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::autopilot::error::RaceError;
use crate::autopilot::types::{Real, VehicleId};

pub const DEFAULT_LAP_TARGET: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishRecord {
    pub vehicle: VehicleId,
    pub name: String,
    pub finish_time: Real, // s since race start
    pub laps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub position: usize,
    pub ordinal: String,
    #[serde(flatten)]
    pub record: FinishRecord,
}

/// "1st", "2nd", "3rd", "4th", ... with the 11th-13th exceptions.
pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

// ============================================
// Registry
// ============================================

#[derive(Debug, Default, Clone)]
pub struct RaceResultsRegistry {
    records: Vec<FinishRecord>,
}

impl RaceResultsRegistry {
    /// Returns true when this was the first record (results-ready trigger).
    pub fn append(&mut self, record: FinishRecord) -> Result<bool, RaceError> {
        if self.contains(record.vehicle) {
            return Err(RaceError::DuplicateFinish(record.vehicle));
        }
        self.records.push(record);
        Ok(self.records.len() == 1)
    }

    pub fn contains(&self, vehicle: VehicleId) -> bool {
        self.records.iter().any(|r| r.vehicle == vehicle)
    }

    /// Append order.
    #[cfg(test)]
    pub fn records(&self) -> &[FinishRecord] {
        &self.records
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted by finish time; equal times keep append order.
    pub fn standings(&self) -> Vec<Standing> {
        let mut sorted = self.records.clone();
        sorted.sort_by(|a, b| a.finish_time.total_cmp(&b.finish_time));

        sorted
            .into_iter()
            .enumerate()
            .map(|(i, record)| Standing {
                position: i + 1,
                ordinal: ordinal(i + 1),
                record,
            })
            .collect()
    }
}

// ============================================
// Progress tracking
// ============================================

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub enum Progress {
    Racing { laps: u32 },
    Finished { laps: u32, finish_time: Real },
}

impl Progress {
    pub fn laps(&self) -> u32 {
        match *self {
            Progress::Racing { laps } | Progress::Finished { laps, .. } => laps,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Progress::Finished { .. })
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Crossing {
    Lap { laps: u32 },
    Finished { laps: u32, finish_time: Real },
    /// Vehicle already finished; nothing changed.
    Ignored,
}

#[derive(Debug, Clone)]
struct Entrant {
    name: String,
    progress: Progress,
}

#[derive(Debug, Clone)]
pub struct RaceProgressTracker {
    lap_target: u32,
    entrants: BTreeMap<VehicleId, Entrant>,
}

impl RaceProgressTracker {
    pub fn new(lap_target: u32) -> Self {
        Self {
            lap_target: lap_target.max(1),
            entrants: BTreeMap::new(),
        }
    }

    pub fn lap_target(&self) -> u32 {
        self.lap_target
    }

    pub fn enter(&mut self, vehicle: VehicleId, name: impl Into<String>) {
        self.entrants.insert(
            vehicle,
            Entrant { name: name.into(), progress: Progress::Racing { laps: 0 } },
        );
    }

    pub fn progress(&self, vehicle: VehicleId) -> Option<Progress> {
        self.entrants.get(&vehicle).map(|e| e.progress)
    }

    pub fn name(&self, vehicle: VehicleId) -> Option<&str> {
        self.entrants.get(&vehicle).map(|e| e.name.as_str())
    }

    pub fn all_finished(&self) -> bool {
        !self.entrants.is_empty() && self.entrants.values().all(|e| e.progress.is_finished())
    }

    pub fn record_crossing(&mut self, vehicle: VehicleId, race_time: Real) -> Result<Crossing, RaceError> {
        let lap_target = self.lap_target;
        let entrant = self
            .entrants
            .get_mut(&vehicle)
            .ok_or(RaceError::UnknownVehicle(vehicle))?;

        let crossing = match entrant.progress {
            Progress::Finished { .. } => Crossing::Ignored,
            Progress::Racing { laps } => {
                let laps = laps + 1;
                if laps >= lap_target {
                    entrant.progress = Progress::Finished { laps, finish_time: race_time };
                    Crossing::Finished { laps, finish_time: race_time }
                } else {
                    entrant.progress = Progress::Racing { laps };
                    Crossing::Lap { laps }
                }
            }
        };
        Ok(crossing)
    }
}

// ============================================
// Session
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaceEvent {
    /// Crossing before the start signal; not counted.
    NotStarted,
    Lap { laps: u32 },
    Finished { record: FinishRecord, results_ready: bool },
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RaceSession {
    id: Uuid,
    race_start: Real,
    elapsed: Real,
    tracker: RaceProgressTracker,
    registry: RaceResultsRegistry,
}

impl RaceSession {
    /// `race_start`: seconds of simulated time before the start signal.
    pub fn new(lap_target: u32, race_start: Real) -> Self {
        Self {
            id: Uuid::new_v4(),
            race_start: race_start.max(0.0),
            elapsed: 0.0,
            tracker: RaceProgressTracker::new(lap_target),
            registry: RaceResultsRegistry::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn enter(&mut self, vehicle: VehicleId, name: impl Into<String>) {
        self.tracker.enter(vehicle, name);
    }

    pub fn advance(&mut self, dt: Real) -> Real {
        self.elapsed += dt;
        self.elapsed
    }

    pub fn elapsed(&self) -> Real {
        self.elapsed
    }

    pub fn race_start(&self) -> Real {
        self.race_start
    }

    pub fn has_started(&self) -> bool {
        self.elapsed >= self.race_start
    }

    /// Seconds since the start signal (negative during the countdown).
    pub fn race_time(&self) -> Real {
        self.elapsed - self.race_start
    }

    pub fn progress(&self, vehicle: VehicleId) -> Option<Progress> {
        self.tracker.progress(vehicle)
    }

    pub fn lap_target(&self) -> u32 {
        self.tracker.lap_target()
    }

    #[cfg(test)]
    pub fn registry(&self) -> &RaceResultsRegistry {
        &self.registry
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.registry.standings()
    }

    pub fn is_complete(&self) -> bool {
        self.tracker.all_finished()
    }

    /// Finish-line trigger for `vehicle`.
    pub fn finish_line_crossed(&mut self, vehicle: VehicleId) -> Result<RaceEvent, RaceError> {
        if !self.has_started() {
            return Ok(RaceEvent::NotStarted);
        }

        let race_time = self.race_time();
        match self.tracker.record_crossing(vehicle, race_time)? {
            Crossing::Ignored => Ok(RaceEvent::Ignored),
            Crossing::Lap { laps } => {
                log::info!("{vehicle} completed lap {laps}/{}", self.lap_target());
                Ok(RaceEvent::Lap { laps })
            }
            Crossing::Finished { laps, finish_time } => {
                let name = self.tracker.name(vehicle).unwrap_or_default().to_string();
                let record = FinishRecord { vehicle, name, finish_time, laps };

                let results_ready = self.registry.append(record.clone())?;
                log::info!("{} finished in {:.3} seconds.", record.name, finish_time);
                if results_ready {
                    self.publish();
                }
                Ok(RaceEvent::Finished { record, results_ready })
            }
        }
    }

    fn publish(&self) {
        log::info!("Race results:");
        for s in self.standings() {
            log::info!("  {:>4}  {:<16} {:>9.3}s", s.ordinal, s.record.name, s.record.finish_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: VehicleId = VehicleId(1);
    const B: VehicleId = VehicleId(2);

    fn session() -> RaceSession {
        let mut s = RaceSession::new(DEFAULT_LAP_TARGET, 0.0);
        s.enter(A, "alpha");
        s.enter(B, "bravo");
        s
    }

    #[test]
    fn ordinals() {
        let got: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 23, 101, 111]
            .into_iter()
            .map(ordinal)
            .collect();
        assert_eq!(
            got,
            ["1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd", "23rd", "101st", "111th"]
        );
    }

    #[test]
    fn second_crossing_finishes() {
        let mut s = session();
        s.advance(5.0);
        assert_eq!(s.finish_line_crossed(A).unwrap(), RaceEvent::Lap { laps: 1 });
        s.advance(5.0);
        match s.finish_line_crossed(A).unwrap() {
            RaceEvent::Finished { record, results_ready } => {
                assert!(results_ready);
                assert_eq!(record.laps, 2);
                assert_eq!(record.finish_time, 10.0);
                assert_eq!(record.name, "alpha");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.progress(A), Some(Progress::Finished { laps: 2, finish_time: 10.0 }));
    }

    #[test]
    fn finished_is_terminal() {
        let mut s = session();
        s.advance(1.0);
        s.finish_line_crossed(A).unwrap();
        s.finish_line_crossed(A).unwrap();

        assert_eq!(s.finish_line_crossed(A).unwrap(), RaceEvent::Ignored);
        assert_eq!(s.progress(A).unwrap().laps(), 2);
        assert_eq!(s.registry().len(), 1);
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut reg = RaceResultsRegistry::default();
        let rec = FinishRecord { vehicle: A, name: "alpha".into(), finish_time: 3.0, laps: 2 };
        assert_eq!(reg.append(rec.clone()), Ok(true));
        assert_eq!(reg.append(rec), Err(RaceError::DuplicateFinish(A)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn two_finishers_in_order_trigger_once() {
        let dt = 0.5;
        let mut s = session();
        let mut triggers = Vec::new();

        for tick in 1..=14 {
            s.advance(dt);
            let crossing = match tick {
                3 | 10 => Some(A),
                4 | 12 => Some(B),
                _ => None,
            };
            if let Some(car) = crossing {
                if let RaceEvent::Finished { results_ready: true, .. } = s.finish_line_crossed(car).unwrap() {
                    triggers.push(tick);
                }
            }
        }

        assert_eq!(triggers, vec![10]);
        let recs = s.registry().records();
        assert_eq!(recs.iter().map(|r| r.vehicle).collect::<Vec<_>>(), vec![A, B]);
        assert!(recs[0].finish_time <= recs[1].finish_time);
        assert!(s.is_complete());
    }

    #[test]
    fn standings_sort_by_time_not_laps() {
        let mut reg = RaceResultsRegistry::default();
        reg.append(FinishRecord { vehicle: B, name: "bravo".into(), finish_time: 42.0, laps: 2 }).unwrap();
        reg.append(FinishRecord { vehicle: A, name: "alpha".into(), finish_time: 40.5, laps: 3 }).unwrap();

        let standings = reg.standings();
        assert_eq!(standings[0].record.vehicle, A);
        assert_eq!(standings[0].ordinal, "1st");
        assert_eq!(standings[1].position, 2);
        // append order untouched
        assert_eq!(reg.records()[0].vehicle, B);
    }

    #[test]
    fn crossings_before_start_do_not_count() {
        let mut s = RaceSession::new(2, 3.0);
        s.enter(A, "alpha");
        s.advance(1.0);
        assert_eq!(s.finish_line_crossed(A).unwrap(), RaceEvent::NotStarted);
        s.advance(3.0);
        assert_eq!(s.finish_line_crossed(A).unwrap(), RaceEvent::Lap { laps: 1 });
        assert_eq!(s.race_time(), 1.0);
    }

    #[test]
    fn unknown_vehicle_is_an_error() {
        let mut s = session();
        assert_eq!(s.finish_line_crossed(VehicleId(99)), Err(RaceError::UnknownVehicle(VehicleId(99))));
    }

    #[test]
    fn sessions_are_independent() {
        let mut first = session();
        let second = session();
        first.advance(1.0);
        first.finish_line_crossed(A).unwrap();
        first.finish_line_crossed(A).unwrap();
        assert_eq!(first.registry().len(), 1);
        assert!(second.registry().is_empty());
        assert_ne!(first.id(), second.id());
    }
}
