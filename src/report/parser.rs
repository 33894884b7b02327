//! Flattening of the nested suite tree into per-test records.

use super::{Report, Spec, Suite, TestRecord};

/// Visit every spec in `suites`, at any depth, in document order.
///
/// The visitor receives the spec's resolved file: its own `file` when set,
/// otherwise the nearest enclosing suite's.
pub fn visit_specs<'a, F>(suites: &'a [Suite], visitor: &mut F)
where
    F: FnMut(&'a str, &'a Spec),
{
    walk(suites, "", visitor);
}

fn walk<'a, F>(suites: &'a [Suite], parent_file: &'a str, visitor: &mut F)
where
    F: FnMut(&'a str, &'a Spec),
{
    for suite in suites {
        let file = suite.file.as_deref().unwrap_or(parent_file);

        for spec in &suite.specs {
            let spec_file = spec.file.as_deref().unwrap_or(file);
            visitor(spec_file, spec);
        }

        walk(&suite.suites, file, visitor);
    }
}

/// Flatten a report into one record per spec.
///
/// The first test's first attempt is the representative outcome; later
/// retries are not modelled here. Specs without any test are skipped.
pub fn flatten(report: &Report) -> Vec<TestRecord> {
    let mut records = Vec::new();
    visit_specs(&report.suites, &mut |file, spec| {
        let Some(test) = spec.tests.first() else {
            return;
        };
        let first = test.results.first();
        let duration = first.map(|a| a.duration.max(0.0).round() as u64).unwrap_or(0);
        let error = first
            .and_then(|a| a.errors.first())
            .and_then(|e| e.message.clone())
            .unwrap_or_default();

        records.push(TestRecord {
            title: spec.title.clone(),
            file: file.to_string(),
            tags: spec.tags.iter().cloned().collect(),
            status: test.status,
            duration,
            error,
        });
    });
    records
}
