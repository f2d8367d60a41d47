use di_abstractions::InjectionSchema;
use injection_macros::Injectable;
use std::sync::Arc;

pub struct Logger;
pub struct Formatter;

#[derive(Default, Injectable)]
pub struct ReportService {
    #[inject(id = "Logger")]
    logger: Option<Arc<Logger>>,
    #[inject(named = "csv", optional)]
    formatter: Option<Arc<Formatter>>,
    title: String,
}

fn main() {
    let service = ReportService::default();
    assert!(service.logger.is_none());
    assert!(service.formatter.is_none());
    assert!(service.title.is_empty());
    assert_eq!(ReportService::injection_declarations().len(), 2);
}
