//! Linking flat pipeline responses into workflow graphs.
//!
//! The pipeline-config APIs return workflows as flat trees of component
//! references plus separate CI, CD, and webhook lists. This module joins
//! them into per-workflow node graphs: git materials feed CI nodes, CI and
//! webhook nodes feed deployment chains, and each deployment chain is
//! pre-CD → CD → post-CD with downstream deployments hanging off the
//! chain's tail.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::{BulkflowError, Result};

use super::types::{
    CdPipeline, CiPipeline, CiPipelineKind, EnvironmentRef, NodeKey, NodeKind, PipelineKind,
    TreeBranch, WebhookDetails, Workflow, WorkflowDescriptor, WorkflowNode,
};

/// Join flat pipeline responses into linked workflow graphs.
///
/// Workflows and their branches are processed in ascending id order.
/// Branches referencing missing components, inactive or deleted CI
/// pipelines, or CD pipelines awaiting deletion are skipped; a branch that
/// names an already-linked component is ignored. Cyclic parent references
/// are rejected.
#[instrument(skip_all, fields(
    workflow_count = descriptors.len(),
    ci_count = ci_pipelines.len(),
    cd_count = cd_pipelines.len(),
))]
pub fn process_workflows(
    descriptors: &[WorkflowDescriptor],
    ci_pipelines: &[CiPipeline],
    cd_pipelines: &[CdPipeline],
    webhooks: &[WebhookDetails],
) -> Result<Vec<Workflow>> {
    let ci_by_id: HashMap<u32, &CiPipeline> = ci_pipelines
        .iter()
        .filter(|pipeline| pipeline.active && !pipeline.deleted)
        .map(|pipeline| (pipeline.id, pipeline))
        .collect();
    let cd_by_id: HashMap<u32, &CdPipeline> = cd_pipelines
        .iter()
        .map(|pipeline| (pipeline.id, pipeline))
        .collect();
    let webhook_by_id: HashMap<u32, &WebhookDetails> = webhooks
        .iter()
        .map(|webhook| (webhook.id, webhook))
        .collect();

    let mut ordered: Vec<&WorkflowDescriptor> = descriptors.iter().collect();
    ordered.sort_by_key(|descriptor| descriptor.id);

    let mut workflows = Vec::with_capacity(ordered.len());
    for descriptor in ordered {
        let workflow = build_workflow(descriptor, &ci_by_id, &cd_by_id, &webhook_by_id)?;
        debug!(
            workflow_id = workflow.id,
            node_count = workflow.nodes.len(),
            "Linked workflow"
        );
        workflows.push(workflow);
    }

    Ok(workflows)
}

/// CI pipelines that mirror another environment's deployed image rather than
/// building one. Bulk build triggers exclude these ids.
pub fn linked_cd_sources(ci_pipelines: &[CiPipeline]) -> HashMap<u32, &CiPipeline> {
    ci_pipelines
        .iter()
        .filter(|pipeline| pipeline.kind == CiPipelineKind::LinkedCd)
        .map(|pipeline| (pipeline.id, pipeline))
        .collect()
}

fn build_workflow(
    descriptor: &WorkflowDescriptor,
    ci_by_id: &HashMap<u32, &CiPipeline>,
    cd_by_id: &HashMap<u32, &CdPipeline>,
    webhook_by_id: &HashMap<u32, &WebhookDetails>,
) -> Result<Workflow> {
    let mut nodes: Vec<WorkflowNode> = Vec::new();
    let mut index: HashMap<NodeKey, usize> = HashMap::new();

    let mut branches: Vec<&TreeBranch> = descriptor.tree.iter().collect();
    branches.sort_by_key(|branch| branch.id);

    for branch in branches {
        match branch.kind {
            PipelineKind::Ci => {
                let Some(pipeline) = ci_by_id.get(&branch.component_id) else {
                    debug!(
                        component_id = branch.component_id,
                        "Skipping branch for missing or inactive CI pipeline"
                    );
                    continue;
                };
                let ci_key = NodeKey::new(NodeKind::Ci, pipeline.id);
                if index.contains_key(&ci_key) {
                    continue;
                }
                push_node(
                    &mut nodes,
                    &mut index,
                    WorkflowNode {
                        key: ci_key,
                        title: pipeline.name.clone(),
                        environment: None,
                        parent: None,
                        downstreams: Vec::new(),
                    },
                );
                for material in &pipeline.materials {
                    let git_key = NodeKey::new(NodeKind::Git, material.id);
                    if let Some(&existing) = index.get(&git_key) {
                        // Material shared by another CI in this workflow
                        nodes[existing].downstreams.push(ci_key);
                    } else {
                        push_node(
                            &mut nodes,
                            &mut index,
                            WorkflowNode {
                                key: git_key,
                                title: material.name.clone(),
                                environment: None,
                                parent: None,
                                downstreams: vec![ci_key],
                            },
                        );
                    }
                }
            }
            PipelineKind::Webhook => {
                let Some(webhook) = webhook_by_id.get(&branch.component_id) else {
                    debug!(
                        component_id = branch.component_id,
                        "Skipping branch for missing webhook"
                    );
                    continue;
                };
                let key = NodeKey::new(NodeKind::Webhook, webhook.id);
                if index.contains_key(&key) {
                    continue;
                }
                push_node(
                    &mut nodes,
                    &mut index,
                    WorkflowNode {
                        key,
                        title: webhook.name.clone(),
                        environment: None,
                        parent: None,
                        downstreams: Vec::new(),
                    },
                );
            }
            PipelineKind::Cd => {
                let Some(pipeline) = cd_by_id.get(&branch.component_id) else {
                    debug!(
                        component_id = branch.component_id,
                        "Skipping branch for missing CD pipeline"
                    );
                    continue;
                };
                if pipeline.deployment_app_delete_requested {
                    debug!(
                        pipeline_id = pipeline.id,
                        "Skipping CD pipeline awaiting deletion"
                    );
                    continue;
                }
                let cd_key = NodeKey::new(NodeKind::Cd, pipeline.id);
                if index.contains_key(&cd_key) {
                    continue;
                }
                let parent = resolve_parent(descriptor, branch, pipeline)?;
                push_deployment_chain(&mut nodes, &mut index, pipeline, cd_key, parent);
            }
        }
    }

    link_downstreams(&mut nodes, &index);

    let workflow = Workflow {
        id: descriptor.id,
        app_id: descriptor.app_id,
        name: descriptor.name.clone(),
        nodes,
    };
    ensure_acyclic(&workflow, &index)?;
    Ok(workflow)
}

/// Upstream reference for a deployment chain. The workflow tree's own parent
/// fields take precedence; the pipeline's fields are the fallback.
fn resolve_parent(
    descriptor: &WorkflowDescriptor,
    branch: &TreeBranch,
    pipeline: &CdPipeline,
) -> Result<Option<NodeKey>> {
    match (branch.parent_id, branch.parent_kind) {
        (Some(id), Some(kind)) => Ok(Some(upstream_key(kind, id))),
        (None, None) => Ok(pipeline
            .parent_pipeline_id
            .zip(pipeline.parent_pipeline_kind)
            .map(|(id, kind)| upstream_key(kind, id))),
        _ => Err(BulkflowError::WorkflowStructure(format!(
            "branch {} of workflow {} carries a partial parent reference",
            branch.id, descriptor.name
        ))),
    }
}

fn upstream_key(kind: PipelineKind, id: u32) -> NodeKey {
    let kind = match kind {
        PipelineKind::Ci => NodeKind::Ci,
        PipelineKind::Webhook => NodeKind::Webhook,
        PipelineKind::Cd => NodeKind::Cd,
    };
    NodeKey::new(kind, id)
}

/// Emit the pre-CD → CD → post-CD chain for one deployment pipeline. Stage
/// nodes exist only when configured; the parent reference sits on the
/// chain's entry node.
fn push_deployment_chain(
    nodes: &mut Vec<WorkflowNode>,
    index: &mut HashMap<NodeKey, usize>,
    pipeline: &CdPipeline,
    cd_key: NodeKey,
    parent: Option<NodeKey>,
) {
    let environment = EnvironmentRef {
        id: pipeline.environment_id,
        name: pipeline.environment_name.clone(),
    };
    let pre_key = pipeline
        .has_pre_stage
        .then(|| NodeKey::new(NodeKind::PreCd, pipeline.id));
    let post_key = pipeline
        .has_post_stage
        .then(|| NodeKey::new(NodeKind::PostCd, pipeline.id));

    if let Some(pre) = pre_key {
        push_node(
            nodes,
            index,
            WorkflowNode {
                key: pre,
                title: pipeline.name.clone(),
                environment: Some(environment.clone()),
                parent,
                downstreams: vec![cd_key],
            },
        );
    }

    push_node(
        nodes,
        index,
        WorkflowNode {
            key: cd_key,
            title: pipeline.name.clone(),
            environment: Some(environment.clone()),
            parent: if pre_key.is_some() { None } else { parent },
            downstreams: post_key.into_iter().collect(),
        },
    );

    if let Some(post) = post_key {
        push_node(
            nodes,
            index,
            WorkflowNode {
                key: post,
                title: pipeline.name.clone(),
                environment: Some(environment),
                parent: None,
                downstreams: Vec::new(),
            },
        );
    }
}

fn push_node(
    nodes: &mut Vec<WorkflowNode>,
    index: &mut HashMap<NodeKey, usize>,
    node: WorkflowNode,
) {
    index.insert(node.key, nodes.len());
    nodes.push(node);
}

/// Attach each chain's entry node to its upstream. A CD parent feeds
/// downstreams from its post-CD node when it has one; unresolvable parents
/// are skipped, matching how partially-loaded responses are rendered.
fn link_downstreams(nodes: &mut [WorkflowNode], index: &HashMap<NodeKey, usize>) {
    let mut edges: Vec<(usize, NodeKey)> = Vec::new();
    for node in nodes.iter() {
        let Some(parent) = node.parent else {
            continue;
        };
        let source = if parent.kind == NodeKind::Cd {
            let post = NodeKey::new(NodeKind::PostCd, parent.id);
            if index.contains_key(&post) {
                post
            } else {
                parent
            }
        } else {
            parent
        };
        match index.get(&source) {
            Some(&source_index) => edges.push((source_index, node.key)),
            None => {
                debug!(parent = %parent, node = %node.key, "Skipping downstream link for missing parent");
            }
        }
    }
    for (source_index, key) in edges {
        nodes[source_index].downstreams.push(key);
    }
}

/// Reject graphs with cyclic downstream edges (bad parent references in the
/// tree would otherwise send traversals into a loop).
fn ensure_acyclic(workflow: &Workflow, index: &HashMap<NodeKey, usize>) -> Result<()> {
    let mut visited: HashSet<NodeKey> = HashSet::new();
    let mut rec_stack: HashSet<NodeKey> = HashSet::new();

    for node in &workflow.nodes {
        if !visited.contains(&node.key)
            && has_cycle_dfs(workflow, index, node.key, &mut visited, &mut rec_stack)
        {
            return Err(BulkflowError::CyclicWorkflow(format!(
                "cycle involving node {} in workflow {}",
                node.key, workflow.name
            )));
        }
    }

    Ok(())
}

fn has_cycle_dfs(
    workflow: &Workflow,
    index: &HashMap<NodeKey, usize>,
    key: NodeKey,
    visited: &mut HashSet<NodeKey>,
    rec_stack: &mut HashSet<NodeKey>,
) -> bool {
    visited.insert(key);
    rec_stack.insert(key);

    if let Some(&node_index) = index.get(&key) {
        for &downstream in &workflow.nodes[node_index].downstreams {
            if !visited.contains(&downstream) {
                if has_cycle_dfs(workflow, index, downstream, visited, rec_stack) {
                    return true;
                }
            } else if rec_stack.contains(&downstream) {
                return true;
            }
        }
    }

    rec_stack.remove(&key);
    false
}
