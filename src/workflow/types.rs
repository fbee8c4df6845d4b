//! Flat pipeline API response shapes and the linked node model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of component referenced by a workflow tree branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineKind {
    /// A build pipeline
    Ci,
    /// An external CI delivering images over a webhook
    Webhook,
    /// A deployment pipeline
    Cd,
}

/// How a CI pipeline sources its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CiPipelineKind {
    /// Builds from its own git materials
    Build,
    /// Reuses another app's CI pipeline
    LinkedBuild,
    /// Mirrors another environment's deployed image (no build of its own)
    LinkedCd,
}

/// Git material a CI pipeline builds from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMaterial {
    /// Material id, unique within the app
    pub id: u32,
    /// Repository name shown on the source node
    pub name: String,
}

/// CI pipeline entry from the pipeline-config response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiPipeline {
    /// Pipeline id
    pub id: u32,
    /// Pipeline display name
    pub name: String,
    /// Inactive pipelines are dropped before linking
    pub active: bool,
    /// Soft-deleted pipelines are dropped before linking
    pub deleted: bool,
    /// Image sourcing mode
    pub kind: CiPipelineKind,
    /// Git materials feeding this pipeline
    pub materials: Vec<GitMaterial>,
}

/// CD pipeline entry from the deployment-config response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdPipeline {
    /// Pipeline id
    pub id: u32,
    /// Pipeline display name
    pub name: String,
    /// Target environment id
    pub environment_id: u32,
    /// Target environment name
    pub environment_name: String,
    /// Whether a pre-deployment stage is configured
    pub has_pre_stage: bool,
    /// Whether a post-deployment stage is configured
    pub has_post_stage: bool,
    /// Upstream pipeline id, when the workflow tree does not carry one
    pub parent_pipeline_id: Option<u32>,
    /// Upstream pipeline kind, when the workflow tree does not carry one
    pub parent_pipeline_kind: Option<PipelineKind>,
    /// Pipelines awaiting deletion are dropped before linking
    pub deployment_app_delete_requested: bool,
}

/// External CI (webhook) details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDetails {
    /// External CI id
    pub id: u32,
    /// Display name shown on the webhook node
    pub name: String,
}

/// One branch in a workflow tree: a component reference plus its upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeBranch {
    /// Branch id; branches are linked in ascending id order
    pub id: u32,
    /// Id of the referenced CI/CD/webhook component
    pub component_id: u32,
    /// Kind of the referenced component
    pub kind: PipelineKind,
    /// Upstream component id
    pub parent_id: Option<u32>,
    /// Upstream component kind
    pub parent_kind: Option<PipelineKind>,
}

/// A workflow as returned by the workflow list API: a flat tree of component
/// references, resolved against the pipeline lists during linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    /// Workflow id; workflows are linked in ascending id order
    pub id: u32,
    /// Owning application id
    pub app_id: u32,
    /// Workflow display name
    pub name: String,
    /// Component references making up the workflow
    pub tree: Vec<TreeBranch>,
}

/// Node role in a linked workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Git source material
    Git,
    /// External CI webhook
    Webhook,
    /// Build pipeline
    Ci,
    /// Pre-deployment stage
    PreCd,
    /// Deployment
    Cd,
    /// Post-deployment stage
    PostCd,
}

impl NodeKind {
    fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Git => "GIT",
            NodeKind::Webhook => "WEBHOOK",
            NodeKind::Ci => "CI",
            NodeKind::PreCd => "PRECD",
            NodeKind::Cd => "CD",
            NodeKind::PostCd => "POSTCD",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graph address of a node: role plus component id, rendered as `"CD-12"`.
///
/// Pre and post stages share their deployment pipeline's id, so the kind is
/// part of the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    /// Node role
    pub kind: NodeKind,
    /// Component id
    pub id: u32,
}

impl NodeKey {
    /// Create a node key.
    pub fn new(kind: NodeKind, id: u32) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// Environment a deployment node targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRef {
    /// Environment id
    pub id: u32,
    /// Environment name
    pub name: String,
}

/// One node in a linked workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Graph address of this node
    pub key: NodeKey,
    /// Display title (pipeline, material, or webhook name)
    pub title: String,
    /// Target environment, for deployment-chain nodes
    pub environment: Option<EnvironmentRef>,
    /// Upstream pipeline this node hangs off, from the workflow tree. Set
    /// only on a deployment chain's entry node (the pre-CD node when one
    /// exists, the CD node otherwise).
    pub parent: Option<NodeKey>,
    /// Keys of the nodes this one feeds
    pub downstreams: Vec<NodeKey>,
}

/// A linked workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow id
    pub id: u32,
    /// Owning application id
    pub app_id: u32,
    /// Workflow display name
    pub name: String,
    /// Linked nodes, in branch order (chain nodes adjacent)
    pub nodes: Vec<WorkflowNode>,
}

impl Workflow {
    /// Look up a node by its graph address.
    pub fn node(&self, key: &NodeKey) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|node| node.key == *key)
    }

    /// Nodes with no inbound edges (git materials, webhooks, orphan chains).
    pub fn roots(&self) -> Vec<&WorkflowNode> {
        let mut fed: std::collections::HashSet<NodeKey> = std::collections::HashSet::new();
        for node in &self.nodes {
            fed.extend(node.downstreams.iter().copied());
        }
        self.nodes.iter().filter(|n| !fed.contains(&n.key)).collect()
    }
}
