//! Fulfillment progress tracker
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, ProgressEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "stage_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageType { OrderConfirmed, NurseryAllocation, GrowthPhase, ReadyForDispatch, Delivered }

impl StageType {
    pub const ALL: [StageType; 5] = [Self::OrderConfirmed, Self::NurseryAllocation, Self::GrowthPhase, Self::ReadyForDispatch, Self::Delivered];

    /// Completion percentage once this stage is current.
    pub fn percentage(&self) -> i32 {
        match self {
            Self::OrderConfirmed => 0,
            Self::NurseryAllocation => 20,
            Self::GrowthPhase => 40,
            Self::ReadyForDispatch => 70,
            Self::Delivered => 100,
        }
    }

    /// Stages an admin may move an order to.
    pub fn is_admin_target(&self) -> bool {
        matches!(self, Self::GrowthPhase | Self::ReadyForDispatch | Self::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderConfirmed => "ORDER_CONFIRMED",
            Self::NurseryAllocation => "NURSERY_ALLOCATION",
            Self::GrowthPhase => "GROWTH_PHASE",
            Self::ReadyForDispatch => "READY_FOR_DISPATCH",
            Self::Delivered => "DELIVERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus { Pending, InProgress, Completed }

impl StageStatus {
    pub const ALL: [StageStatus; 3] = [Self::Pending, Self::InProgress, Self::Completed];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub stage: StageType,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTracker {
    id: Uuid,
    order_id: Uuid,
    current_stage: Option<StageType>,
    progress_percentage: i32,
    stages: Json<Vec<Stage>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl ProgressTracker {
    /// All stages pending, nothing current.
    pub fn new(order_id: Uuid, now: DateTime<Utc>) -> Self {
        let stages = StageType::ALL
            .into_iter()
            .map(|stage| Stage { stage, status: StageStatus::Pending, started_at: None, completed_at: None })
            .collect();
        Self {
            id: Uuid::now_v7(), order_id, current_stage: None, progress_percentage: 0,
            stages: Json(stages), created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn current_stage(&self) -> Option<StageType> { self.current_stage }
    pub fn progress_percentage(&self) -> i32 { self.progress_percentage }
    pub fn stages(&self) -> &[Stage] { &self.stages.0 }
    pub fn stage(&self, stage: StageType) -> Option<&Stage> { self.stages.0.iter().find(|s| s.stage == stage) }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn is_confirmed(&self) -> bool {
        self.stage(StageType::OrderConfirmed).is_some_and(|s| s.status == StageStatus::Completed)
    }

    /// Payment captured: order confirmation completes and nursery allocation starts.
    /// Returns `false` when the tracker was already confirmed.
    pub fn confirm_payment(&mut self, order_created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.is_confirmed() { return false; }
        self.set(StageType::OrderConfirmed, StageStatus::Completed, Some(order_created_at), Some(now));
        self.set(StageType::NurseryAllocation, StageStatus::InProgress, Some(now), None);
        self.reach(StageType::NurseryAllocation, now);
        true
    }

    /// Moves forward to `target`, completing every stage in between.
    pub fn advance_to(&mut self, target: StageType, now: DateTime<Utc>) -> Result<(), ProgressError> {
        if !target.is_admin_target() { return Err(ProgressError::InvalidTarget(target)); }
        let current = match self.current_stage {
            Some(current) if self.is_confirmed() => current,
            _ => return Err(ProgressError::NotConfirmed),
        };
        if target <= current { return Err(ProgressError::NotForward { current, target }); }

        for stage in StageType::ALL.into_iter().filter(|s| *s >= current && *s < target) {
            let started = self.stage(stage).and_then(|s| s.started_at).unwrap_or(now);
            self.set(stage, StageStatus::Completed, Some(started), Some(now));
        }
        if target == StageType::Delivered {
            self.set(target, StageStatus::Completed, Some(now), Some(now));
        } else {
            self.set(target, StageStatus::InProgress, Some(now), None);
        }
        self.reach(target, now);
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn set(&mut self, stage: StageType, status: StageStatus, started_at: Option<DateTime<Utc>>, completed_at: Option<DateTime<Utc>>) {
        if let Some(entry) = self.stages.0.iter_mut().find(|s| s.stage == stage) {
            entry.status = status;
            entry.started_at = started_at;
            entry.completed_at = completed_at;
        }
    }

    fn reach(&mut self, stage: StageType, now: DateTime<Utc>) {
        self.current_stage = Some(stage);
        self.progress_percentage = stage.percentage();
        self.updated_at = now;
        self.events.push(DomainEvent::Progress(ProgressEvent::StageReached {
            order_id: self.order_id, stage, progress: self.progress_percentage,
        }));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("Invalid stage: {0:?} cannot be set manually")]
    InvalidTarget(StageType),
    #[error("order payment has not been confirmed")]
    NotConfirmed,
    #[error("cannot move from {current:?} back to {target:?}")]
    NotForward { current: StageType, target: StageType },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn confirmed() -> ProgressTracker {
        let now = Utc::now();
        let mut tracker = ProgressTracker::new(Uuid::new_v4(), now);
        tracker.confirm_payment(now - Duration::minutes(10), now);
        tracker.take_events();
        tracker
    }

    #[test]
    fn test_new_tracker_is_all_pending() {
        let tracker = ProgressTracker::new(Uuid::new_v4(), Utc::now());
        assert_eq!(tracker.current_stage(), None);
        assert_eq!(tracker.progress_percentage(), 0);
        assert!(tracker.stages().iter().all(|s| s.status == StageStatus::Pending));
        assert_eq!(tracker.stages().len(), 5);
    }

    #[test]
    fn test_confirm_payment_is_idempotent() {
        let now = Utc::now();
        let created = now - Duration::hours(1);
        let mut tracker = ProgressTracker::new(Uuid::new_v4(), created);
        assert!(tracker.confirm_payment(created, now));
        assert!(!tracker.confirm_payment(created, now + Duration::minutes(1)));
        assert_eq!(tracker.current_stage(), Some(StageType::NurseryAllocation));
        assert_eq!(tracker.progress_percentage(), 20);
        let confirmed = tracker.stage(StageType::OrderConfirmed).unwrap();
        assert_eq!((confirmed.started_at, confirmed.completed_at), (Some(created), Some(now)));
        assert_eq!(tracker.take_events().len(), 1);
    }

    #[test]
    fn test_advance_skips_intermediate_stages() {
        let mut tracker = confirmed();
        tracker.advance_to(StageType::ReadyForDispatch, Utc::now()).unwrap();
        assert_eq!(tracker.progress_percentage(), 70);
        assert_eq!(tracker.stage(StageType::NurseryAllocation).unwrap().status, StageStatus::Completed);
        assert_eq!(tracker.stage(StageType::GrowthPhase).unwrap().status, StageStatus::Completed);
        assert_eq!(tracker.stage(StageType::ReadyForDispatch).unwrap().status, StageStatus::InProgress);
        assert_eq!(tracker.stage(StageType::Delivered).unwrap().status, StageStatus::Pending);
    }

    #[test]
    fn test_delivered_completes_immediately() {
        let mut tracker = confirmed();
        tracker.advance_to(StageType::Delivered, Utc::now()).unwrap();
        assert_eq!(tracker.progress_percentage(), 100);
        assert!(tracker.stages().iter().all(|s| s.status == StageStatus::Completed));
    }

    #[test]
    fn test_advance_rejects_backwards_and_manual_stages() {
        let mut tracker = confirmed();
        tracker.advance_to(StageType::GrowthPhase, Utc::now()).unwrap();
        assert_eq!(
            tracker.advance_to(StageType::GrowthPhase, Utc::now()),
            Err(ProgressError::NotForward { current: StageType::GrowthPhase, target: StageType::GrowthPhase })
        );
        assert_eq!(tracker.advance_to(StageType::NurseryAllocation, Utc::now()), Err(ProgressError::InvalidTarget(StageType::NurseryAllocation)));
    }

    #[test]
    fn test_advance_requires_confirmation() {
        let mut tracker = ProgressTracker::new(Uuid::new_v4(), Utc::now());
        assert_eq!(tracker.advance_to(StageType::GrowthPhase, Utc::now()), Err(ProgressError::NotConfirmed));
    }
}
