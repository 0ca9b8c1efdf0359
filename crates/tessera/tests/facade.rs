//! Configuration-driven pipeline construction through the facade.

use tessera::prelude::*;

fn mark(key: &'static str) -> RegisterStep {
    RegisterStep::with_behavior(
        key,
        "Marks the context",
        FnBehavior::new(move |ctx: &mut RootContext| {
            ctx.extensions_mut().set_with_key(key, true);
            Ok(())
        }),
    )
}

fn configured(toml: &str) -> TesseraConfig {
    ConfigLoader::new()
        .with_string(toml, "toml")
        .unwrap()
        .load()
        .unwrap()
}

#[tokio::test]
async fn configured_strategy_and_disabled_steps_apply() {
    let config = configured(
        r#"
        [pipeline]
        strategy = "trusted_positional"
        disabled_steps = ["audit", "never-registered"]
        "#,
    );

    let pipeline = tessera::pipeline_builder::<RootContext>(&config)
        .register(mark("audit"))
        .register(mark("decode").insert_after_if_exists("audit"))
        .build(&Container::new(), &config.to_settings().unwrap())
        .unwrap();

    assert_eq!(pipeline.strategy(), InvocationStrategy::TrustedPositional);
    assert_eq!(pipeline.len(), 1);

    let mut ctx = RootContext::new();
    pipeline.invoke(&mut ctx).await.unwrap();
    assert!(ctx.extensions().contains("decode"));
    assert!(!ctx.extensions().contains("audit"));
}

#[tokio::test]
async fn configured_settings_drive_enablement() {
    let config = configured(
        r#"
        [settings]
        "Outbox.Enabled" = false
        "#,
    );
    let settings = config.to_settings().unwrap();

    let pipeline = tessera::pipeline_builder::<RootContext>(&config)
        .register(mark("outbox").enabled_when(|s| {
            s.try_get::<bool>("outbox.enabled").copied().unwrap_or(true)
        }))
        .register(mark("handle"))
        .build(&Container::new(), &settings)
        .unwrap();

    let ids: Vec<_> = pipeline.steps().iter().map(|s| s.id()).collect();
    assert_eq!(ids, ["handle"]);
}

#[test]
fn invalid_logging_config_is_rejected_before_install() {
    let mut config = TesseraConfig::default();
    config.logging.level = "tessera=loud".to_string();

    assert!(config.validate().is_err());
    assert!(tessera::init_logging(&config).is_err());
}
