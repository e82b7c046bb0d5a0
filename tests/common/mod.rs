// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    client::Client,
};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let ns = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": {
                "test": "integration",
                "managed-by": "kube-dns-manager-test"
            }
        }
    }))?;

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {
            println!("Created test namespace: {name}");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            println!("Test namespace already exists: {name}");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => println!("Deleted test namespace: {name}"),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            println!("Test namespace already deleted: {name}");
        }
        Err(e) => eprintln!("Failed to delete test namespace {name}: {e}"),
    }
}

/// Create (or replace) a ConfigMap holding the given string data
pub async fn apply_config_map(
    client: &Client,
    namespace: &str,
    name: &str,
    data: serde_json::Value,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let config_map = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name },
        "data": data,
    });

    config_maps
        .patch(
            name,
            &PatchParams::apply("kube-dns-manager-test").force(),
            &Patch::Apply(config_map),
        )
        .await?;

    println!("Applied ConfigMap: {namespace}/{name}");
    Ok(())
}

/// Create a LoadBalancer Service and publish `ip` in its status
pub async fn create_load_balancer(
    client: &Client,
    namespace: &str,
    name: &str,
    ip: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);

    let service = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name },
        "spec": {
            "type": "LoadBalancer",
            "selector": { "app": name },
            "ports": [{ "name": "http", "port": 80, "targetPort": 8080 }]
        }
    }))?;

    match services.create(&PostParams::default(), &service).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 409 => {}
        Err(e) => return Err(Box::new(e)),
    }

    services
        .patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({
                "status": { "loadBalancer": { "ingress": [{ "ip": ip }] } }
            })),
        )
        .await?;

    println!("Created LoadBalancer service {namespace}/{name} at {ip}");
    Ok(())
}

/// Create an Ingress with one rule per host
pub async fn create_ingress(
    client: &Client,
    namespace: &str,
    name: &str,
    hosts: &[&str],
    annotations: serde_json::Value,
) -> Result<Ingress, Box<dyn std::error::Error>> {
    let ingresses: Api<Ingress> = Api::namespaced(client.clone(), namespace);

    let rules: Vec<_> = hosts
        .iter()
        .map(|host| {
            json!({
                "host": host,
                "http": {
                    "paths": [{
                        "path": "/",
                        "pathType": "Prefix",
                        "backend": { "service": { "name": "web", "port": { "number": 80 } } }
                    }]
                }
            })
        })
        .collect();

    let ingress = serde_json::from_value(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": { "name": name, "annotations": annotations },
        "spec": { "rules": rules }
    }))?;

    let created = ingresses.create(&PostParams::default(), &ingress).await?;
    println!("Created Ingress: {namespace}/{name}");
    Ok(created)
}

/// Wait for a resource to be ready
pub async fn wait_for_ready(duration: Duration) {
    println!("Waiting {} seconds for resources to be ready...", duration.as_secs());
    sleep(duration).await;
}
