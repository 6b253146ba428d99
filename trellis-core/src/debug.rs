// Read-only summaries of the registered routes

use crate::{HttpMethod, MetadataRegistry, ParameterBinding};
use serde::Serialize;
use std::collections::BTreeMap;

/// One route of a controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointInfo {
    /// `"VERB /base/sub"`
    pub route: String,
    /// Declared parameter bindings, e.g. `"@RequestParam id"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub controller: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerMetadata {
    pub name: String,
    pub path: String,
    pub middleware: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodMetadata {
    pub key: String,
    pub method: HttpMethod,
    pub path: String,
    pub middleware: usize,
}

/// Everything registered for one controller
#[derive(Debug, Clone, Serialize)]
pub struct RawMetadata {
    pub controller_metadata: ControllerMetadata,
    pub method_metadata: Vec<MethodMetadata>,
    pub parameter_metadata: BTreeMap<String, Vec<ParameterBinding>>,
}

/// Summarize every controller and its endpoints
pub fn get_route_info(registry: &MetadataRegistry) -> Vec<RouteInfo> {
    registry
        .controllers()
        .iter()
        .map(|controller| {
            let endpoints = registry
                .actions_for(controller.target)
                .iter()
                .map(|action| {
                    let params = registry.parameters_for(controller.target, &action.key);
                    let args = (!params.is_empty()).then(|| params.iter().map(describe).collect());

                    EndpointInfo {
                        route: format!(
                            "{} {}{}",
                            action.method, controller.base_path, action.path
                        ),
                        args,
                    }
                })
                .collect();

            RouteInfo {
                controller: controller.name.clone(),
                endpoints,
            }
        })
        .collect()
}

/// The registry's content per controller
pub fn get_raw_metadata(registry: &MetadataRegistry) -> Vec<RawMetadata> {
    registry
        .controllers()
        .iter()
        .map(|controller| {
            let actions = registry.actions_for(controller.target);

            RawMetadata {
                controller_metadata: ControllerMetadata {
                    name: controller.name.clone(),
                    path: controller.base_path.clone(),
                    middleware: controller.middleware.len(),
                },
                method_metadata: actions
                    .iter()
                    .map(|action| MethodMetadata {
                        key: action.key.clone(),
                        method: action.method,
                        path: action.path.clone(),
                        middleware: action.middleware.len(),
                    })
                    .collect(),
                parameter_metadata: actions
                    .iter()
                    .map(|action| {
                        (
                            action.key.clone(),
                            registry
                                .parameters_for(controller.target, &action.key)
                                .to_vec(),
                        )
                    })
                    .filter(|(_, params)| !params.is_empty())
                    .collect(),
            }
        })
        .collect()
}

fn describe(binding: &ParameterBinding) -> String {
    match &binding.name {
        Some(name) => format!("{} {}", binding.kind.symbol(), name),
        None => binding.kind.symbol().to_string(),
    }
}
