use lazy_static::lazy_static;
use prometheus::{IntCounter, Opts, Registry};

lazy_static! {
    pub static ref APPEND_COUNT: IntCounter = IntCounter::with_opts(
        Opts::new("append_count", "Number of values appended to history trees").namespace("histree"),
    )
    .unwrap();
    pub static ref AGG_COUNT: IntCounter = IntCounter::with_opts(
        Opts::new(
            "aggregate_count",
            "Number of aggregates computed for frozen nodes",
        )
        .namespace("histree"),
    )
    .unwrap();
    pub static ref REPARENT_COUNT: IntCounter = IntCounter::with_opts(
        Opts::new("reparent_count", "Number of times a root was replaced by a taller one")
            .namespace("histree"),
    )
    .unwrap();
    pub static ref PARSE_COUNT: IntCounter = IntCounter::with_opts(
        Opts::new("parse_count", "Number of trees rebuilt from an encoding").namespace("histree"),
    )
    .unwrap();
}

pub(crate) fn register(registry: &Registry) -> anyhow::Result<()> {
    registry.register(Box::new(APPEND_COUNT.clone()))?;
    registry.register(Box::new(AGG_COUNT.clone()))?;
    registry.register(Box::new(REPARENT_COUNT.clone()))?;
    registry.register(Box::new(PARSE_COUNT.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_counters() -> anyhow::Result<()> {
        let registry = Registry::new();
        register(&registry)?;
        let names = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect::<Vec<_>>();
        assert!(names.contains(&"histree_append_count".to_string()));
        assert!(names.contains(&"histree_reparent_count".to_string()));
        assert_eq!(names.len(), 4);
        // a second registration of the same counters is refused
        assert!(register(&registry).is_err());
        Ok(())
    }
}
