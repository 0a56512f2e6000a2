//! crates/fitqa_core/src/store/calories.rs
//!
//! Calorie logging and the chart series derived from it. Accounts only.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashMap;
use tracing::{error, info};

use super::{log_read_failure, AppStore};
use crate::domain::{CalorieEntry, ChangeFilter, DailyCalories, MonthlyAverage, Table};
use crate::error::{StoreError, StoreResult};
use crate::ports::ChangeStream;

pub const MONTHLY_POINTS: i64 = 30;

const GUEST_CALORIES_MESSAGE: &str = "Calorie tracking is only available for signed-in users";

/// Parses the calorie field of the entry form. Zero is a valid day.
pub fn parse_calories(input: &str) -> StoreResult<u32> {
    let input = input.trim();
    if input.is_empty() {
        return Err(StoreError::Validation("Please enter a calorie amount".to_string()));
    }
    input.parse::<u32>().map_err(|_| {
        StoreError::Validation("Please enter a valid positive number".to_string())
    })
}

impl AppStore {
    /// Writes the total for `date`, replacing any existing entry for that day.
    pub async fn add_calorie_entry(&self, date: NaiveDate, calories: u32) -> StoreResult<CalorieEntry> {
        let user_id = self
            .account_id()
            .await
            .ok_or_else(|| StoreError::GuestNotAllowed(GUEST_CALORIES_MESSAGE.to_string()))?;
        let now = self.clock.now();

        let result = async {
            match self.remote.find_calorie_entry(&user_id, date).await? {
                Some(existing) => {
                    self.remote
                        .update_calorie_entry(CalorieEntry {
                            calories,
                            updated_at: now,
                            ..existing
                        })
                        .await
                }
                None => {
                    self.remote
                        .insert_calorie_entry(CalorieEntry {
                            user_id: user_id.clone(),
                            date,
                            calories,
                            updated_at: now,
                        })
                        .await
                }
            }
        }
        .await;

        match result {
            Ok(entry) => {
                info!(%date, calories, "Calorie entry saved");
                Ok(entry)
            }
            Err(e) => {
                error!(%date, "Failed to save calorie entry: {}", e);
                Err(e.into())
            }
        }
    }

    /// Entries in `[start, end]`, oldest first. Guests and failed reads get an
    /// empty list.
    pub async fn get_calorie_entries(&self, start: NaiveDate, end: NaiveDate) -> Vec<CalorieEntry> {
        let Some(user_id) = self.account_id().await else {
            return Vec::new();
        };
        if start > end {
            return Vec::new();
        }
        match self.remote.list_calorie_entries(&user_id, start, end).await {
            Ok(mut entries) => {
                entries.sort_by_key(|e| e.date);
                entries
            }
            Err(e) => {
                log_read_failure("calorie entries", &e);
                Vec::new()
            }
        }
    }

    /// Thirty consecutive days ending today; days without an entry read 0.
    pub async fn get_monthly_calories(&self) -> Vec<DailyCalories> {
        let today = self.clock.today();
        let start = today - Duration::days(MONTHLY_POINTS - 1);

        let by_date: HashMap<NaiveDate, u32> = self
            .get_calorie_entries(start, today)
            .await
            .into_iter()
            .map(|e| (e.date, e.calories))
            .collect();

        start
            .iter_days()
            .take(MONTHLY_POINTS as usize)
            .map(|date| DailyCalories {
                date,
                calories: by_date.get(&date).copied().unwrap_or(0),
            })
            .collect()
    }

    /// One point per month of the current year: the mean of recorded days, or 0.
    pub async fn get_yearly_calories(&self) -> Vec<MonthlyAverage> {
        let year = self.clock.today().year();
        let (Some(start), Some(end)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Vec::new();
        };

        let mut totals = [(0u64, 0u32); 12];
        for entry in self.get_calorie_entries(start, end).await {
            let slot = &mut totals[entry.date.month0() as usize];
            slot.0 += u64::from(entry.calories);
            slot.1 += 1;
        }

        totals
            .iter()
            .zip(1u32..)
            .map(|(&(sum, days), month)| MonthlyAverage {
                month,
                average_calories: if days == 0 {
                    0.0
                } else {
                    sum as f64 / f64::from(days)
                },
            })
            .collect()
    }

    /// Live changes to this account's calorie entries. Empty for guests or when
    /// the subscription cannot be set up.
    pub async fn calorie_changes(&self) -> ChangeStream {
        let Some(user_id) = self.account_id().await else {
            return Box::pin(futures::stream::empty());
        };
        match self
            .remote
            .subscribe(ChangeFilter::for_user(Table::CalorieTracker, user_id))
            .await
        {
            Ok(changes) => changes,
            Err(e) => {
                log_read_failure("calorie change subscription", &e);
                Box::pin(futures::stream::empty())
            }
        }
    }

    async fn account_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .filter(|s| !s.is_guest)
            .map(|s| s.id.clone())
    }
}
