//! End-to-end composition through the public facade.

use std::sync::Arc;

use tarkib::prelude::*;
use tracing::info;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Repository;

struct Service {
    repository: Instance,
}

struct AppProvider;

impl ExportDescriptorProvider for AppProvider {
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        _accessor: &mut dyn DependencyAccessor,
    ) -> Vec<Arc<ExportDescriptorPromise>> {
        if *contract == Contract::of::<Repository>() {
            vec![ExportDescriptorPromise::new(
                contract.clone(),
                "Repository",
                false,
                Box::new(|_| Ok(Vec::new())),
                Box::new(|_| {
                    Ok(ExportDescriptor::direct(
                        Arc::new(|_, _| Ok(Arc::new(Repository) as Instance)),
                        ExportMetadata::new(),
                    ))
                }),
            )]
        } else if *contract == Contract::of::<Service>() {
            let repository = Contract::of::<Repository>();
            vec![ExportDescriptorPromise::new(
                contract.clone(),
                "Service",
                false,
                Box::new(move |accessor| {
                    Ok(vec![accessor.resolve_required_dependency(
                        "repository",
                        &repository,
                        true,
                    )?])
                }),
                Box::new(|dependencies| {
                    let target = dependencies[0].target().cloned().ok_or_else(|| {
                        CompositionError::UpdateMisuse("repository import unsatisfied".to_string())
                    })?;
                    let activator = target.descriptor()?.activator();
                    Ok(ExportDescriptor::direct(
                        Arc::new(move |context, operation| {
                            let repository = activator(context, operation)?;
                            Ok(Arc::new(Service { repository }) as Instance)
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

#[test]
fn activates_a_service_with_its_repository() {
    init_tracing();

    let registry = ExportDescriptorRegistry::new(vec![Arc::new(AppProvider)]);
    let descriptor = registry
        .get_single_for_export(&Contract::of::<Service>())
        .unwrap();
    let instance =
        CompositionOperation::run(&ActivationContext::new(), &descriptor.activator()).unwrap();
    info!("composition complete");

    let service = instance.downcast_ref::<Service>().unwrap();
    assert!(service.repository.downcast_ref::<Repository>().is_some());
}

#[test]
fn missing_contract_reports_a_readable_error() {
    init_tracing();

    struct Nothing;

    let registry = ExportDescriptorRegistry::new(vec![Arc::new(AppProvider)]);
    let err = registry
        .get_single_for_export(&Contract::of::<Nothing>())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "No export was found for the contract 'Nothing'."
    );
}
