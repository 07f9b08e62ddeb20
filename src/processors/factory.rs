//! Stage Factory Module
//!
//! A dynamic registry mapping stage kind names to constructors. Each
//! constructor builds the stage's processor from its configuration and
//! wraps it in a [`DataProcessor`] carrying the stage's declared flags
//! (order-sensitive / permuting / bottleneck / two-pass), so the driver
//! knows how to schedule it without knowing what it does.
//!
//! For most stages the flags are static. `bin` and `fillnull` decide
//! theirs from the options actually present (a `bin` without a span
//! must learn the value range first, a bare `fillnull` must learn the
//! field-name union), and `tail`'s bottleneck flag may additionally be
//! relaxed by the chain rewrite in `core::pipeline` once the whole
//! chain is known.
//!
//! Custom stages can be registered at runtime with [`register_stage`];
//! built-ins are registered on first access.

use crate::config::StageConfig;
use crate::core::dataprocessor::{DataProcessor, StageFlags};
use crate::processors::processor::Processor;

use crate::processors::bin::BinProcessor;
use crate::processors::dedup::DedupProcessor;
use crate::processors::eval::EvalProcessor;
use crate::processors::fields::FieldsProcessor;
use crate::processors::fillnull::FillnullProcessor;
use crate::processors::gentimes::GentimesProcessor;
use crate::processors::head::HeadProcessor;
use crate::processors::makemv::MakemvProcessor;
use crate::processors::regex::RegexProcessor;
use crate::processors::rex::RexProcessor;
use crate::processors::search::SearchProcessor;
use crate::processors::sort::SortProcessor;
use crate::processors::stats::StatsProcessor;
use crate::processors::streamstats::StreamstatsProcessor;
use crate::processors::tail::TailProcessor;
use crate::processors::timechart::TimechartProcessor;
use crate::processors::top::{RareProcessor, TopProcessor};
use crate::processors::transaction::TransactionProcessor;
use crate::processors::where_::WhereProcessor;

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// A stage constructor: configuration in, flagged driver node out.
type NodeConstructor = Box<dyn Fn(&StageConfig) -> anyhow::Result<DataProcessor> + Send + Sync>;

static STAGE_REGISTRY: OnceLock<Mutex<HashMap<String, NodeConstructor>>> = OnceLock::new();

fn get_stage_registry() -> &'static Mutex<HashMap<String, NodeConstructor>> {
    STAGE_REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Lists all registered stage kinds, sorted.
pub fn list_stages() -> Vec<String> {
    ensure_default_stages();

    let registry = get_stage_registry().lock().unwrap();
    let mut names: Vec<String> = registry.keys().cloned().collect();
    names.sort();
    names
}

/// Checks whether a stage kind exists in the registry.
pub fn stage_exists(name: &str) -> bool {
    ensure_default_stages();

    let registry = get_stage_registry().lock().unwrap();
    registry.contains_key(name)
}

/// Registers a stage constructor, replacing any previous registration
/// under the same name.
pub fn register_stage(name: &str, constructor: NodeConstructor) {
    let mut registry = get_stage_registry().lock().unwrap();
    registry.insert(name.to_string(), constructor);
}

/// Creates the driver node for one stage configuration.
pub fn create_node(config: &StageConfig) -> anyhow::Result<DataProcessor> {
    tracing::debug!("creating stage '{}'", config.r#type);

    ensure_default_stages();

    let registry = get_stage_registry().lock().unwrap();
    registry
        .get(&config.r#type)
        .ok_or_else(|| anyhow::anyhow!("stage '{}' not found", config.r#type))
        .and_then(|constructor| constructor(config))
}

fn node(
    name: &'static str,
    processor: Box<dyn Processor>,
    flags: StageFlags,
) -> anyhow::Result<DataProcessor> {
    Ok(DataProcessor::new(name, processor, flags))
}

fn ensure_default_stages() {
    static INITIALIZED: OnceLock<()> = OnceLock::new();
    INITIALIZED.get_or_init(|| {
        register_stage(
            "bin",
            Box::new(|config| {
                let processor = BinProcessor::from_config(config)?;
                let needs_bounds = processor.needs_bounds();
                node(
                    "bin",
                    Box::new(processor),
                    StageFlags {
                        bottleneck: needs_bounds,
                        two_pass: needs_bounds,
                        ..StageFlags::default()
                    },
                )
            }),
        );
        register_stage(
            "dedup",
            Box::new(|config| {
                node(
                    "dedup",
                    Box::new(DedupProcessor::from_config(config)?),
                    StageFlags { input_order_matters: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "eval",
            Box::new(|config| {
                node("eval", Box::new(EvalProcessor::from_config(config)?), StageFlags::default())
            }),
        );
        register_stage(
            "fields",
            Box::new(|config| {
                node(
                    "fields",
                    Box::new(FieldsProcessor::from_config(config)?),
                    StageFlags::default(),
                )
            }),
        );
        register_stage(
            "fillnull",
            Box::new(|config| {
                let processor = FillnullProcessor::from_config(config)?;
                let needs_scan = processor.needs_field_scan();
                node(
                    "fillnull",
                    Box::new(processor),
                    StageFlags {
                        bottleneck: needs_scan,
                        two_pass: needs_scan,
                        ..StageFlags::default()
                    },
                )
            }),
        );
        register_stage(
            "gentimes",
            Box::new(|config| {
                node(
                    "gentimes",
                    Box::new(GentimesProcessor::from_config(config)?),
                    StageFlags::default(),
                )
            }),
        );
        register_stage(
            "head",
            Box::new(|config| {
                node(
                    "head",
                    Box::new(HeadProcessor::from_config(config)?),
                    StageFlags { input_order_matters: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "tail",
            Box::new(|config| {
                node(
                    "tail",
                    Box::new(TailProcessor::from_config(config)?),
                    StageFlags {
                        input_order_matters: true,
                        permuting: true,
                        // May be relaxed by the chain rewrite when every
                        // earlier permuting stage is itself a bottleneck.
                        bottleneck: true,
                        two_pass: false,
                    },
                )
            }),
        );
        register_stage(
            "makemv",
            Box::new(|config| {
                node(
                    "makemv",
                    Box::new(MakemvProcessor::from_config(config)?),
                    StageFlags::default(),
                )
            }),
        );
        register_stage(
            "regex",
            Box::new(|config| {
                node("regex", Box::new(RegexProcessor::from_config(config)?), StageFlags::default())
            }),
        );
        register_stage(
            "rex",
            Box::new(|config| {
                node("rex", Box::new(RexProcessor::from_config(config)?), StageFlags::default())
            }),
        );
        register_stage(
            "search",
            Box::new(|config| {
                node(
                    "search",
                    Box::new(SearchProcessor::from_config(config)?),
                    StageFlags::default(),
                )
            }),
        );
        register_stage(
            "where",
            Box::new(|config| {
                node("where", Box::new(WhereProcessor::from_config(config)?), StageFlags::default())
            }),
        );
        register_stage(
            "streamstats",
            Box::new(|config| {
                node(
                    "streamstats",
                    Box::new(StreamstatsProcessor::from_config(config)?),
                    StageFlags { input_order_matters: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "timechart",
            Box::new(|config| {
                node(
                    "timechart",
                    Box::new(TimechartProcessor::from_config(config)?),
                    StageFlags { bottleneck: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "stats",
            Box::new(|config| {
                node(
                    "stats",
                    Box::new(StatsProcessor::from_config(config)?),
                    StageFlags { bottleneck: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "top",
            Box::new(|config| {
                node(
                    "top",
                    Box::new(TopProcessor::from_config(config)?),
                    StageFlags { permuting: true, bottleneck: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "rare",
            Box::new(|config| {
                node(
                    "rare",
                    Box::new(RareProcessor::from_config(config)?),
                    StageFlags { permuting: true, bottleneck: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "transaction",
            Box::new(|config| {
                node(
                    "transaction",
                    Box::new(TransactionProcessor::from_config(config)?),
                    StageFlags { input_order_matters: true, ..StageFlags::default() },
                )
            }),
        );
        register_stage(
            "sort",
            Box::new(|config| {
                node(
                    "sort",
                    Box::new(SortProcessor::from_config(config)?),
                    StageFlags { permuting: true, bottleneck: true, ..StageFlags::default() },
                )
            }),
        );

        tracing::debug!("default stages registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(kind: &str, params: serde_json::Value) -> StageConfig {
        StageConfig {
            r#type: kind.to_string(),
            parameters: serde_json::from_value(params).unwrap(),
        }
    }

    #[test]
    fn catalog_lists_every_stage_kind() {
        let stages = list_stages();

        for kind in [
            "bin", "dedup", "eval", "fields", "fillnull", "gentimes", "head", "tail", "makemv",
            "regex", "rex", "search", "where", "streamstats", "timechart", "stats", "top", "rare",
            "transaction", "sort",
        ] {
            assert!(stages.iter().any(|s| s == kind), "missing stage '{kind}'");
            assert!(stage_exists(kind));
        }
        assert!(!stage_exists("frobnicate"));
    }

    #[test]
    fn declared_flags_match_the_catalog() {
        let sort = create_node(&config("sort", json!({"by": ["v"]}))).unwrap();
        assert!(sort.is_permuting() && sort.is_bottleneck() && !sort.is_two_pass());

        let stats = create_node(&config("stats", json!({"aggregates": [{"function": "count"}]})))
            .unwrap();
        assert!(stats.is_bottleneck() && !stats.is_permuting());

        let head = create_node(&config("head", json!({}))).unwrap();
        assert!(head.does_input_order_matter() && !head.is_bottleneck());

        let tail = create_node(&config("tail", json!({}))).unwrap();
        assert!(tail.is_permuting() && tail.is_bottleneck());

        let dedup = create_node(&config("dedup", json!({"fields": ["service"]}))).unwrap();
        assert!(dedup.does_input_order_matter() && !dedup.is_permuting());
    }

    #[test]
    fn conditional_flags_follow_the_options() {
        let spanned = create_node(&config("bin", json!({"field": "v", "span": 10.0}))).unwrap();
        assert!(!spanned.is_bottleneck() && !spanned.is_two_pass());

        let binned = create_node(&config("bin", json!({"field": "v", "bins": 4}))).unwrap();
        assert!(binned.is_bottleneck() && binned.is_two_pass());

        let listed = create_node(&config("fillnull", json!({"fields": ["a"]}))).unwrap();
        assert!(!listed.is_two_pass());

        let bare = create_node(&config("fillnull", json!({}))).unwrap();
        assert!(bare.is_bottleneck() && bare.is_two_pass());
    }

    #[test]
    fn unknown_stage_kinds_are_rejected() {
        let err = create_node(&config("frobnicate", json!({}))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn constructor_errors_surface() {
        assert!(create_node(&config("sort", json!({}))).is_err());
        assert!(create_node(&config("regex", json!({"pattern": "("}))).is_err());
    }
}
