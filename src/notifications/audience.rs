//! Audience resolution for targeted pushes.
//!
//! A [`TargetFilter`] arrives straight from the operator. It is normalized into
//! an [`AudienceFilter`] once, and that normalized form is what the store
//! sees. Resolution walks the audience page by page so memory stays bounded no
//! matter how many devices match.

use super::error::RepositoryError;
use super::model::{FcmToken, TargetFilter};
use super::repository::NotificationRepository;
use shared::SimplePagination;
use sqlx::{MySql, QueryBuilder};
use std::sync::Arc;

/// Devices idle for this many days are left out of targeted pushes
pub const RECENTLY_ACTIVE_DAYS: i64 = 270;

/// Only this many gender values are honored; extras are ignored
pub const MAX_GENDERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBound {
    Exact(i32),
    /// Inclusive on both ends, bounds taken in the order given
    Between(i32, i32),
}

impl AgeBound {
    /// One value is an exact age, two or more are a range over the first two
    pub fn from_values(values: &[i32]) -> Option<Self> {
        match values {
            [] => None,
            [age] => Some(AgeBound::Exact(*age)),
            [min, max, ..] => Some(AgeBound::Between(*min, *max)),
        }
    }

    pub fn contains(&self, age: i32) -> bool {
        match *self {
            AgeBound::Exact(expected) => age == expected,
            AgeBound::Between(min, max) => min <= age && age <= max,
        }
    }
}

/// Normalized audience criteria. Each populated field narrows the audience.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceFilter {
    pub member_types: Vec<i64>,
    pub genders: Vec<String>,
    pub age: Option<AgeBound>,
    pub member_codes: Vec<String>,
}

impl From<&TargetFilter> for AudienceFilter {
    fn from(filter: &TargetFilter) -> Self {
        let mut genders: Vec<String> = Vec::with_capacity(MAX_GENDERS);
        for gender in &filter.gender {
            if genders.len() == MAX_GENDERS {
                break;
            }
            if !genders.contains(gender) {
                genders.push(gender.clone());
            }
        }

        Self {
            member_types: filter.member_type.clone(),
            genders,
            age: AgeBound::from_values(&filter.age),
            member_codes: filter.member_codes.clone(),
        }
    }
}

impl AudienceFilter {
    /// Builds the page query against the legacy membership schema
    pub fn to_query(&self, page: SimplePagination) -> QueryBuilder<'static, MySql> {
        let mut qb = QueryBuilder::new(
            "SELECT \
                mmt.IdMMember AS member_id, \
                mmt.IdMCabangDaftar AS member_regist_branch_id, \
                mmt.DeviceId AS device_id, \
                mmt.Platform AS platform, \
                mmt.TokenFCM AS token \
            FROM member_mtokenfcm mmt \
            JOIN member_mmember mm ON \
                mm.IdMMember = mmt.IdMMember \
                AND mm.IdMCabangDaftar = mmt.IdMCabangDaftar \
            JOIN member_mkartumember mk ON \
                mk.IdMKartuMember = mm.IdMKartuMember \
                AND mk.IsActive = 1 \
            WHERE (DATEDIFF(NOW(), mmt.TimeLastUsed)) < ",
        );
        qb.push_bind(RECENTLY_ACTIVE_DAYS);

        if !self.member_types.is_empty() {
            qb.push(" AND mk.IdMTipeKartuMember IN (");
            let mut list = qb.separated(", ");
            for member_type in &self.member_types {
                list.push_bind(*member_type);
            }
            list.push_unseparated(")");
        }

        if !self.genders.is_empty() {
            qb.push(" AND mm.Kelamin IN (");
            let mut list = qb.separated(", ");
            for gender in &self.genders {
                list.push_bind(gender.clone());
            }
            list.push_unseparated(")");
        }

        match self.age {
            Some(AgeBound::Exact(age)) => {
                qb.push(" AND (TIMESTAMPDIFF(YEAR, mm.TglLahir, NOW())) = ");
                qb.push_bind(age);
            }
            Some(AgeBound::Between(min, max)) => {
                qb.push(" AND (TIMESTAMPDIFF(YEAR, mm.TglLahir, NOW())) BETWEEN ");
                qb.push_bind(min);
                qb.push(" AND ");
                qb.push_bind(max);
            }
            None => {}
        }

        if !self.member_codes.is_empty() {
            qb.push(" AND (mk.NomorKartu IN (");
            let mut list = qb.separated(", ");
            for code in &self.member_codes {
                list.push_bind(code.clone());
            }
            list.push_unseparated(") AND mk.IsActive = TRUE)");
        }

        // stable ordering keeps offset pages from overlapping
        qb.push(" ORDER BY mmt.IdMMember, mmt.IdMCabangDaftar, mmt.DeviceId LIMIT ");
        qb.push_bind(page.offset());
        qb.push(", ");
        qb.push_bind(page.size());

        qb
    }
}

/// Pages through the devices matching a filter
#[derive(Clone)]
pub struct AudienceResolver {
    repo: Arc<dyn NotificationRepository>,
}

impl AudienceResolver {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    /// One page of the audience. An empty page means resolution is complete.
    pub async fn page(
        &self,
        filter: &AudienceFilter,
        page: SimplePagination,
    ) -> Result<Vec<FcmToken>, RepositoryError> {
        self.repo.get_fcm_tokens_by_filter(filter, page).await
    }
}
