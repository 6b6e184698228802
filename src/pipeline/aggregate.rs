use std::collections::HashMap;
use tracing::info;

use crate::config::AggregationLevel;
use crate::pipeline::types::{AggregateBucket, Period, RegionId, TripRecord};

/// Groups trips into per-(period, region) demand buckets.
///
/// Every trip lands in exactly one bucket. Keys with no trips get no bucket.
/// The result is sorted by period; buckets sharing a period keep first-seen order.
pub fn aggregate_trips(trips: &[TripRecord], level: AggregationLevel) -> Vec<AggregateBucket> {
    let mut index: HashMap<(Period, &RegionId), usize> = HashMap::new();
    let mut buckets: Vec<AggregateBucket> = Vec::new();

    for trip in trips {
        let period = Period::of(trip, level);
        let slot = *index.entry((period, &trip.region)).or_insert_with(|| {
            buckets.push(AggregateBucket {
                date: period.date,
                hour: period.hour,
                region: trip.region.clone(),
                demand: 0,
                total_passengers: 0,
                day_of_week: trip.day_of_week,
                month: trip.month,
                is_weekend: u8::from(trip.is_weekend()),
            });
            buckets.len() - 1
        });

        let bucket = &mut buckets[slot];
        bucket.demand += 1;
        bucket.total_passengers += u64::from(trip.passenger_count);
    }

    buckets.sort_by_key(|b| b.period());

    info!(
        trips = trips.len(),
        buckets = buckets.len(),
        ?level,
        "Trips aggregated"
    );
    buckets
}
