//! Minimal composition walkthrough: a config part consumed by an API
//! part, plus the error message a missing contract produces.
//!
//! Run with `RUST_LOG=trace cargo run --example compose` to watch the
//! resolution pass.

use std::sync::Arc;

use tarkib::prelude::*;
use tracing::info;

struct Config {
    prefix: String,
}

struct Api {
    config: Instance,
}

impl Api {
    fn greet(&self, who: &str) -> String {
        let prefix = self
            .config
            .downcast_ref::<Config>()
            .map(|config| config.prefix.as_str())
            .unwrap_or("hello");
        format!("{prefix}, {who}!")
    }
}

struct AppProvider;

impl ExportDescriptorProvider for AppProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _accessor: &mut dyn DependencyAccessor,
    ) -> Vec<Arc<ExportDescriptorPromise>> {
        if *contract == Contract::of::<Config>() {
            vec![ExportDescriptorPromise::new(
                contract.clone(),
                "Config",
                false,
                Box::new(|_| Ok(Vec::new())),
                Box::new(|_| {
                    Ok(ExportDescriptor::direct(
                        Arc::new(|_, _| {
                            Ok(Arc::new(Config {
                                prefix: "salam".to_string(),
                            }) as Instance)
                        }),
                        ExportMetadata::new(),
                    ))
                }),
            )]
        } else if *contract == Contract::of::<Api>() {
            let config = Contract::of::<Config>();
            vec![ExportDescriptorPromise::new(
                contract.clone(),
                "Api",
                false,
                Box::new(move |accessor| {
                    Ok(vec![accessor.resolve_required_dependency(
                        "config", &config, true,
                    )?])
                }),
                Box::new(|dependencies| {
                    let target = dependencies[0].target().cloned().ok_or_else(|| {
                        CompositionError::UpdateMisuse("config import unsatisfied".to_string())
                    })?;
                    let activator = target.descriptor()?.activator();
                    Ok(ExportDescriptor::direct(
                        Arc::new(move |context, operation| {
                            let config = activator(context, operation)?;
                            Ok(Arc::new(Api { config }) as Instance)
                        }),
                        ExportMetadata::new(),
                    ))
                }),
            )]
        } else {
            Vec::new()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let registry = ExportDescriptorRegistry::new(vec![Arc::new(AppProvider)]);

    let descriptor = registry.get_single_for_export(&Contract::of::<Api>())?;
    let instance =
        CompositionOperation::run(&ActivationContext::new(), &descriptor.activator())?;
    let api = instance.downcast_ref::<Api>().expect("api instance");
    info!("composition complete");
    println!("{}", api.greet("world"));

    // A contract nothing exports fails with the full "required by" chain.
    struct Unknown;
    if let Err(err) = registry.get_single_for_export(&Contract::of::<Unknown>()) {
        println!("{err}");
    }

    Ok(())
}
