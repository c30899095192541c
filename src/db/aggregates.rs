// Pre-aggregated views over fetched audit rows
//
// The year filter applies to the audit start date's year, both bounds
// inclusive. Groupings are computed in memory so they stay testable against
// fixtures without a database.

use std::collections::BTreeMap;

use chrono::Datelike;

use crate::models::{
    AuditRecord, LocationWiseAudits, SbuWiseAudits, YearFilter, YearWiseAudits, YearWiseSbu,
};

fn is_completed(record: &AuditRecord) -> bool {
    record.status.contains("Completed")
}

fn is_in_progress(record: &AuditRecord) -> bool {
    record.status.contains("In progress")
}

pub fn location_wise(records: &[AuditRecord], filter: YearFilter) -> Vec<LocationWiseAudits> {
    let mut buckets: BTreeMap<String, LocationWiseAudits> = BTreeMap::new();
    for record in records {
        if !filter.contains(record.audit_from.year()) {
            continue;
        }
        let bucket = buckets
            .entry(record.location.clone())
            .or_insert_with(|| LocationWiseAudits {
                location: record.location.clone(),
                total: 0,
                completed: 0,
                in_progress: 0,
            });
        bucket.total += 1;
        if is_completed(record) {
            bucket.completed += 1;
        }
        if is_in_progress(record) {
            bucket.in_progress += 1;
        }
    }
    buckets.into_values().collect()
}

pub fn sbu_wise(records: &[AuditRecord], filter: YearFilter) -> Vec<SbuWiseAudits> {
    let mut buckets: BTreeMap<String, SbuWiseAudits> = BTreeMap::new();
    for record in records {
        if !filter.contains(record.audit_from.year()) {
            continue;
        }
        let bucket = buckets
            .entry(record.sbu.clone())
            .or_insert_with(|| SbuWiseAudits {
                sbu: record.sbu.clone(),
                total: 0,
                completed: 0,
                in_progress: 0,
            });
        bucket.total += 1;
        if is_completed(record) {
            bucket.completed += 1;
        }
        if is_in_progress(record) {
            bucket.in_progress += 1;
        }
    }
    buckets.into_values().collect()
}

pub fn year_wise(records: &[AuditRecord]) -> Vec<YearWiseAudits> {
    let mut buckets: BTreeMap<i32, usize> = BTreeMap::new();
    for record in records {
        *buckets.entry(record.audit_from.year()).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(year, total)| YearWiseAudits { year, total })
        .collect()
}

pub fn year_wise_sbu(records: &[AuditRecord]) -> Vec<YearWiseSbu> {
    let mut buckets: BTreeMap<(i32, String), usize> = BTreeMap::new();
    for record in records {
        *buckets
            .entry((record.audit_from.year(), record.sbu.clone()))
            .or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|((year, sbu), total)| YearWiseSbu { year, sbu, total })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_fixtures::audit;

    fn mixed_year_fixture() -> Vec<AuditRecord> {
        vec![
            audit("Mumbai", "Retail", 2021, "Completed"),
            audit("Mumbai", "Retail", 2022, "Completed"),
            audit("Mumbai", "Energy", 2022, "In progress"),
            audit("Pune", "Retail", 2022, "In progress"),
            audit("Pune", "Energy", 2023, "Completed"),
        ]
    }

    #[test]
    fn test_single_year_filter_counts_only_that_year() {
        let records = mixed_year_fixture();
        let filter = YearFilter {
            start_year: Some(2022),
            end_year: Some(2022),
        };

        let by_location = location_wise(&records, filter);
        assert_eq!(
            by_location,
            vec![
                LocationWiseAudits {
                    location: "Mumbai".to_string(),
                    total: 2,
                    completed: 1,
                    in_progress: 1,
                },
                LocationWiseAudits {
                    location: "Pune".to_string(),
                    total: 1,
                    completed: 0,
                    in_progress: 1,
                },
            ]
        );

        let by_sbu = sbu_wise(&records, filter);
        assert_eq!(
            by_sbu,
            vec![
                SbuWiseAudits {
                    sbu: "Energy".to_string(),
                    total: 1,
                    completed: 0,
                    in_progress: 1,
                },
                SbuWiseAudits {
                    sbu: "Retail".to_string(),
                    total: 2,
                    completed: 1,
                    in_progress: 1,
                },
            ]
        );
    }

    #[test]
    fn test_unbounded_filter_counts_everything() {
        let records = mixed_year_fixture();
        let by_location = location_wise(&records, YearFilter::default());
        let total: usize = by_location.iter().map(|b| b.total).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn test_year_wise_groups_by_start_year() {
        let records = mixed_year_fixture();
        let by_year = year_wise(&records);
        assert_eq!(
            by_year,
            vec![
                YearWiseAudits { year: 2021, total: 1 },
                YearWiseAudits { year: 2022, total: 3 },
                YearWiseAudits { year: 2023, total: 1 },
            ]
        );
    }

    #[test]
    fn test_year_wise_sbu_groups_by_year_and_sbu() {
        let records = mixed_year_fixture();
        let by_year_sbu = year_wise_sbu(&records);
        assert!(by_year_sbu.contains(&YearWiseSbu {
            year: 2022,
            sbu: "Retail".to_string(),
            total: 2,
        }));
        assert!(by_year_sbu.contains(&YearWiseSbu {
            year: 2022,
            sbu: "Energy".to_string(),
            total: 1,
        }));
    }
}
