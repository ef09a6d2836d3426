//! Validated mutations of the local replica

use super::{KvStore, LocalReplica, ReplicaRecord};
use crate::error::{Error, Result};
use crate::geometry::LatLng;
use crate::models::{Distribution, DistributionId, PaymentMethod, VisitStatus, Zone, ZoneId};
use crate::sync::SyncScheduler;

/// Partial change to a distribution. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributionEdit {
    pub address: Option<String>,
    pub point: Option<LatLng>,
    pub status: Option<VisitStatus>,
    pub amount: Option<f64>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}

impl DistributionEdit {
    pub const fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.point.is_none()
            && self.status.is_none()
            && self.amount.is_none()
            && self.payment_method.is_none()
            && self.notes.is_none()
    }

    pub fn apply(self, record: &mut Distribution) {
        if let Some(address) = self.address {
            record.address = address;
        }
        if let Some(point) = self.point {
            record.lat = point.lat;
            record.lng = point.lng;
        }
        if let Some(status) = self.status {
            record.status = status;
            if !status.takes_payment() && self.amount.is_none() {
                record.amount = 0.0;
                record.payment_method = None;
            }
        }
        if let Some(amount) = self.amount {
            record.amount = amount;
        }
        if let Some(method) = self.payment_method {
            record.payment_method = Some(method);
        }
        if let Some(notes) = self.notes {
            record.notes = notes;
        }
    }
}

/// Every local create, update and delete goes through here.
///
/// Each mutation validates the record, persists the whole collection and,
/// when a scheduler is attached, (re)starts the sync debounce timer.
pub struct FieldStore<S: KvStore> {
    replica: LocalReplica<S>,
    scheduler: Option<SyncScheduler>,
}

impl<S: KvStore> Clone for FieldStore<S> {
    fn clone(&self) -> Self {
        Self {
            replica: self.replica.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S: KvStore> FieldStore<S> {
    pub const fn new(replica: LocalReplica<S>) -> Self {
        Self {
            replica,
            scheduler: None,
        }
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SyncScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub const fn replica(&self) -> &LocalReplica<S> {
        &self.replica
    }

    pub const fn scheduler(&self) -> Option<&SyncScheduler> {
        self.scheduler.as_ref()
    }

    pub fn distributions(&self) -> Result<Vec<Distribution>> {
        self.replica.load()
    }

    pub fn distribution(&self, id: &DistributionId) -> Result<Distribution> {
        self.find(id.as_str())
    }

    pub fn create_distribution(&self, mut record: Distribution) -> Result<Distribution> {
        record.validate()?;
        record.normalize();
        let created = self.insert(record)?;
        tracing::debug!("Created distribution {}", created.id);
        Ok(created)
    }

    pub fn update_distribution(
        &self,
        id: &DistributionId,
        edit: DistributionEdit,
    ) -> Result<Distribution> {
        self.edit_distribution(id, |record| edit.apply(record))
    }

    /// Apply an arbitrary change to a distribution.
    pub fn edit_distribution(
        &self,
        id: &DistributionId,
        change: impl FnOnce(&mut Distribution),
    ) -> Result<Distribution> {
        let updated = self.modify(id.as_str(), |record: &mut Distribution| {
            change(record);
            record.validate()?;
            record.normalize();
            record.touch();
            Ok(())
        })?;
        tracing::debug!("Updated distribution {}", updated.id);
        Ok(updated)
    }

    pub fn delete_distribution(&self, id: &DistributionId) -> Result<Distribution> {
        let removed = self.remove::<Distribution>(id.as_str())?;
        tracing::debug!("Deleted distribution {}", removed.id);
        Ok(removed)
    }

    pub fn zones(&self) -> Result<Vec<Zone>> {
        self.replica.load()
    }

    pub fn zone(&self, id: &ZoneId) -> Result<Zone> {
        self.find(id.as_str())
    }

    pub fn create_zone(&self, mut zone: Zone) -> Result<Zone> {
        zone.normalize();
        zone.validate()?;
        let created = self.insert(zone)?;
        tracing::debug!("Created zone {} ({})", created.id, created.name);
        Ok(created)
    }

    pub fn edit_zone(&self, id: &ZoneId, change: impl FnOnce(&mut Zone)) -> Result<Zone> {
        let updated = self.modify(id.as_str(), |zone: &mut Zone| {
            change(zone);
            zone.normalize();
            zone.validate()?;
            zone.touch();
            Ok(())
        })?;
        tracing::debug!("Updated zone {}", updated.id);
        Ok(updated)
    }

    pub fn delete_zone(&self, id: &ZoneId) -> Result<Zone> {
        let removed = self.remove::<Zone>(id.as_str())?;
        tracing::debug!("Deleted zone {}", removed.id);
        Ok(removed)
    }

    fn find<R: ReplicaRecord>(&self, id: &str) -> Result<R> {
        self.replica
            .load::<R>()?
            .into_iter()
            .find(|record| record.record_id() == id)
            .ok_or_else(|| not_found::<R>(id))
    }

    fn insert<R: ReplicaRecord>(&self, record: R) -> Result<R> {
        let created = self.replica.modify::<R, _>(|records| {
            if records
                .iter()
                .any(|existing| existing.record_id() == record.record_id())
            {
                return Err(Error::InvalidInput(format!(
                    "{} already contains {}",
                    R::COLLECTION,
                    record.record_id()
                )));
            }
            records.push(record.clone());
            Ok(record)
        })?;
        self.changed();
        Ok(created)
    }

    fn modify<R: ReplicaRecord>(
        &self,
        id: &str,
        change: impl FnOnce(&mut R) -> Result<()>,
    ) -> Result<R> {
        let updated = self.replica.modify::<R, _>(|records| {
            let record = records
                .iter_mut()
                .find(|record| record.record_id() == id)
                .ok_or_else(|| not_found::<R>(id))?;
            change(record)?;
            Ok(record.clone())
        })?;
        self.changed();
        Ok(updated)
    }

    fn remove<R: ReplicaRecord>(&self, id: &str) -> Result<R> {
        let removed = self.replica.modify::<R, _>(|records| {
            let index = records
                .iter()
                .position(|record| record.record_id() == id)
                .ok_or_else(|| not_found::<R>(id))?;
            Ok(records.remove(index))
        })?;
        self.changed();
        Ok(removed)
    }

    fn changed(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule();
        }
    }
}

fn not_found<R: ReplicaRecord>(id: &str) -> Error {
    Error::NotFound(format!("{} {id}", R::COLLECTION))
}
