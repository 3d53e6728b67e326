use serde::{Deserialize, Serialize};

/// Query parameters for the catalog's `/classes` endpoint. Empty strings mean
/// "no filter" for that dimension and are still sent on the wire, never
/// omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub subject: String,
    pub week_day: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Subject,
    WeekDay,
    Time,
}

impl FilterCriteria {
    pub fn set(&mut self, field: FilterField, value: impl Into<String>) {
        let value = value.into();
        match field {
            FilterField::Subject => self.subject = value,
            FilterField::WeekDay => self.week_day = value,
            FilterField::Time => self.time = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_empty() && self.week_day.is_empty() && self.time.is_empty()
    }
}
