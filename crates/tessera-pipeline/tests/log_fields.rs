//! Construction and invocation logs use the shared field names.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tessera_core::{Container, RootContext, SettingsHolder};
use tessera_pipeline::{FnBehavior, Pipeline, RegisterStep, RemoveStep};
use tessera_telemetry::logging::fields;
use tracing::span::Attributes;
use tracing::{Event, Id, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Clone, Default)]
struct FieldNames(Arc<Mutex<BTreeSet<&'static str>>>);

impl FieldNames {
    fn record(&self, names: impl Iterator<Item = &'static str>) {
        self.0.lock().unwrap().extend(names);
    }

    fn contains(&self, name: &str) -> bool {
        self.0.lock().unwrap().contains(name)
    }
}

impl<S: Subscriber> Layer<S> for FieldNames {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.record(event.metadata().fields().iter().map(|field| field.name()));
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        self.record(attrs.metadata().fields().iter().map(|field| field.name()));
    }
}

#[test]
fn pipeline_logs_use_shared_field_names() {
    let names = FieldNames::default();
    let subscriber = tracing_subscriber::registry().with(names.clone());

    tracing::subscriber::with_default(subscriber, || {
        let pipeline = Pipeline::<RootContext>::builder()
            .register(RegisterStep::with_behavior(
                "stamp",
                "Stamps the context",
                FnBehavior::new(|_: &mut RootContext| Ok(())),
            ))
            .remove(RemoveStep::new("never-registered"))
            .log_invocations(true)
            .build(&Container::new(), &SettingsHolder::new())
            .unwrap();

        let mut ctx = RootContext::new();
        tokio_test::block_on(pipeline.invoke(&mut ctx)).unwrap();
    });

    for name in [
        fields::STEP_ID,
        fields::MESSAGE_ID,
        fields::PIPELINE_CONTEXT,
        fields::PIPELINE_STEP_COUNT,
        fields::PIPELINE_STEPS,
        fields::PIPELINE_STRATEGY,
    ] {
        assert!(names.contains(name), "missing field {name}");
    }
}
