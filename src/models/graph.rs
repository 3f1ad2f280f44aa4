use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 用户的好友关系，三个集合都以 public_id 为元素
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendGraph {
    pub friends: BTreeSet<String>,
    pub pending_incoming: BTreeSet<String>,
    pub pending_outgoing: BTreeSet<String>,
}

impl FriendGraph {
    pub fn set(&self, relation: Relation) -> &BTreeSet<String> {
        match relation {
            Relation::Friends => &self.friends,
            Relation::PendingIncoming => &self.pending_incoming,
            Relation::PendingOutgoing => &self.pending_outgoing,
        }
    }

    pub fn set_mut(&mut self, relation: Relation) -> &mut BTreeSet<String> {
        match relation {
            Relation::Friends => &mut self.friends,
            Relation::PendingIncoming => &mut self.pending_incoming,
            Relation::PendingOutgoing => &mut self.pending_outgoing,
        }
    }

    pub fn contains(&self, relation: Relation, peer: &str) -> bool {
        self.set(relation).contains(peer)
    }

    /// 按集合语义应用编辑，重复执行结果不变
    pub fn apply(&mut self, edits: &[GraphEdit]) {
        for edit in edits {
            let set = self.set_mut(edit.relation);
            match edit.op {
                SetOp::Add => {
                    set.insert(edit.peer.clone());
                }
                SetOp::Remove => {
                    set.remove(&edit.peer);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Friends,
    PendingIncoming,
    PendingOutgoing,
}

impl Relation {
    pub const ALL: [Relation; 3] = [
        Relation::Friends,
        Relation::PendingIncoming,
        Relation::PendingOutgoing,
    ];

    /// 持久层中对应的列名
    pub fn column(&self) -> &'static str {
        match self {
            Relation::Friends => "friends",
            Relation::PendingIncoming => "pending_incoming",
            Relation::PendingOutgoing => "pending_outgoing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdit {
    pub op: SetOp,
    pub relation: Relation,
    pub peer: String,
}

impl GraphEdit {
    pub fn add(relation: Relation, peer: &str) -> Self {
        Self {
            op: SetOp::Add,
            relation,
            peer: peer.to_string(),
        }
    }

    pub fn remove(relation: Relation, peer: &str) -> Self {
        Self {
            op: SetOp::Remove,
            relation,
            peer: peer.to_string(),
        }
    }
}

/// 针对单个用户记录的一组编辑
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphUpdate {
    pub public_id: String,
    pub edits: Vec<GraphEdit>,
}

impl GraphUpdate {
    pub fn new(public_id: &str, edits: Vec<GraphEdit>) -> Self {
        Self {
            public_id: public_id.to_string(),
            edits,
        }
    }
}
