use std::sync::Arc;

use serde::Serialize;

use super::presence::PresenceService;
use super::proximity::{NearbyFilter, NearbyResult, ProximityService};
use crate::database::RecordStore;
use crate::error::AppError;
use crate::models::{
    Entity, EntityKind, FriendGraph, GeoPoint, GraphEdit, GraphUpdate, Relation,
};

/// 附近的人查询半径缺省值（米）
pub const DEFAULT_PRESENCE_RADIUS_M: f64 = 3000.0;

/// 附近用户的对外视图
#[derive(Debug, Clone, Serialize)]
pub struct NearbyPresence {
    pub display_name: String,
    pub public_id: String,
    pub distance: f64,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceResult {
    pub users: Vec<NearbyPresence>,
    pub count: usize,
    pub origin: GeoPoint,
    pub radius: f64,
}

impl From<NearbyResult> for PresenceResult {
    fn from(result: NearbyResult) -> Self {
        let users = result
            .hits
            .into_iter()
            .map(|hit| NearbyPresence {
                display_name: hit.entity.display_name,
                public_id: hit.entity.public_id,
                distance: hit.distance,
                longitude: hit.point.longitude,
                latitude: hit.point.latitude,
            })
            .collect();
        Self {
            users,
            count: result.count,
            origin: result.origin,
            radius: result.radius,
        }
    }
}

/// 非正或非法半径使用缺省值
fn effective_radius(radius_m: f64) -> f64 {
    if radius_m.is_finite() && radius_m > 0.0 {
        radius_m
    } else {
        DEFAULT_PRESENCE_RADIUS_M
    }
}

fn require_caller(caller_id: &str) -> Result<(), AppError> {
    if caller_id.trim().is_empty() {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn require_peer(caller_id: &str, peer_id: &str) -> Result<(), AppError> {
    if peer_id.trim().is_empty() {
        return Err(AppError::InvalidInput("目标用户ID不能为空".into()));
    }
    if caller_id == peer_id {
        return Err(AppError::InvalidInput("不能对自己执行好友操作".into()));
    }
    Ok(())
}

/// 好友关系状态机与好友相关的位置查询
///
/// 每次状态迁移都是一组对双方记录的集合增删，整体交给持久层一次提交；
/// 集合语义保证重试安全。检查所依据的那一侧总是最后写入。
pub struct SocialService {
    store: Arc<dyn RecordStore>,
    presence: Arc<PresenceService>,
    proximity: Arc<ProximityService>,
}

impl SocialService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        presence: Arc<PresenceService>,
        proximity: Arc<ProximityService>,
    ) -> Self {
        Self {
            store,
            presence,
            proximity,
        }
    }

    async fn resolve_user(&self, public_id: &str) -> Result<Entity, AppError> {
        let entity = self.presence.get_entity(public_id).await?;
        if entity.kind != EntityKind::User {
            return Err(AppError::NotFound("用户不存在".into()));
        }
        Ok(entity)
    }

    /// 好友关系直接读持久层，不走缓存
    async fn graph(&self, public_id: &str) -> Result<FriendGraph, AppError> {
        self.store
            .friend_graph(public_id)
            .await
            .inspect_err(|e| tracing::error!(public_id, error = %e, "friend graph lookup failed"))?
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))
    }

    async fn commit(&self, operation: &str, updates: Vec<GraphUpdate>) -> Result<(), AppError> {
        self.store
            .apply_graph_updates(&updates)
            .await
            .inspect_err(|e| {
                let ids: Vec<_> = updates.iter().map(|u| u.public_id.as_str()).collect();
                tracing::error!(operation, ?ids, error = %e, "friend graph update failed");
            })?;
        Ok(())
    }

    pub async fn send_request(&self, caller_id: &str, recipient_id: &str) -> Result<(), AppError> {
        require_caller(caller_id)?;
        require_peer(caller_id, recipient_id)?;

        self.resolve_user(recipient_id).await?;
        let (mine, theirs) = tokio::try_join!(self.graph(caller_id), self.graph(recipient_id))?;

        if mine.contains(Relation::Friends, recipient_id) || theirs.contains(Relation::Friends, caller_id)
        {
            return Err(AppError::Conflict("你们已经是好友".into()));
        }
        if mine.contains(Relation::PendingIncoming, recipient_id)
            || theirs.contains(Relation::PendingOutgoing, caller_id)
        {
            return Err(AppError::Conflict("对方已向你发送好友请求".into()));
        }

        let outgoing = mine.contains(Relation::PendingOutgoing, recipient_id);
        let incoming = theirs.contains(Relation::PendingIncoming, caller_id);
        if outgoing && incoming {
            return Err(AppError::Conflict("好友请求已发送，等待对方处理".into()));
        }
        if outgoing || incoming {
            tracing::info!(
                "Repairing half-written friend request {} -> {}",
                caller_id,
                recipient_id
            );
        }

        self.commit(
            "send_friend_request",
            vec![
                GraphUpdate::new(
                    caller_id,
                    vec![GraphEdit::add(Relation::PendingOutgoing, recipient_id)],
                ),
                GraphUpdate::new(
                    recipient_id,
                    vec![GraphEdit::add(Relation::PendingIncoming, caller_id)],
                ),
            ],
        )
        .await?;

        tracing::info!("Friend request sent: {} -> {}", caller_id, recipient_id);
        Ok(())
    }

    /// 接受 sender_id 发来的请求，调用者是接收方
    pub async fn accept_request(&self, caller_id: &str, sender_id: &str) -> Result<(), AppError> {
        require_caller(caller_id)?;
        require_peer(caller_id, sender_id)?;

        let mine = self.graph(caller_id).await?;
        if !mine.contains(Relation::PendingIncoming, sender_id) {
            return Err(AppError::NotFound("没有来自该用户的好友请求".into()));
        }

        // 两个方向的待处理记录一并清理
        self.commit(
            "accept_friend_request",
            vec![
                GraphUpdate::new(
                    sender_id,
                    vec![
                        GraphEdit::add(Relation::Friends, caller_id),
                        GraphEdit::remove(Relation::PendingOutgoing, caller_id),
                        GraphEdit::remove(Relation::PendingIncoming, caller_id),
                    ],
                ),
                GraphUpdate::new(
                    caller_id,
                    vec![
                        GraphEdit::add(Relation::Friends, sender_id),
                        GraphEdit::remove(Relation::PendingIncoming, sender_id),
                        GraphEdit::remove(Relation::PendingOutgoing, sender_id),
                    ],
                ),
            ],
        )
        .await?;

        tracing::info!("Friend request accepted: {} -> {}", sender_id, caller_id);
        Ok(())
    }

    /// 拒绝 sender_id 发来的请求
    pub async fn decline_request(&self, caller_id: &str, sender_id: &str) -> Result<(), AppError> {
        require_caller(caller_id)?;
        require_peer(caller_id, sender_id)?;

        let mine = self.graph(caller_id).await?;
        if !mine.contains(Relation::PendingIncoming, sender_id) {
            return Err(AppError::NotFound("没有来自该用户的好友请求".into()));
        }

        self.commit(
            "decline_friend_request",
            vec![
                GraphUpdate::new(
                    sender_id,
                    vec![GraphEdit::remove(Relation::PendingOutgoing, caller_id)],
                ),
                GraphUpdate::new(
                    caller_id,
                    vec![GraphEdit::remove(Relation::PendingIncoming, sender_id)],
                ),
            ],
        )
        .await?;

        tracing::info!("Friend request declined: {} -> {}", sender_id, caller_id);
        Ok(())
    }

    /// 撤回自己发给 recipient_id 的请求
    pub async fn cancel_request(&self, caller_id: &str, recipient_id: &str) -> Result<(), AppError> {
        require_caller(caller_id)?;
        require_peer(caller_id, recipient_id)?;

        let mine = self.graph(caller_id).await?;
        if !mine.contains(Relation::PendingOutgoing, recipient_id) {
            return Err(AppError::NotFound("没有发给该用户的好友请求".into()));
        }

        self.commit(
            "cancel_friend_request",
            vec![
                GraphUpdate::new(
                    recipient_id,
                    vec![GraphEdit::remove(Relation::PendingIncoming, caller_id)],
                ),
                GraphUpdate::new(
                    caller_id,
                    vec![GraphEdit::remove(Relation::PendingOutgoing, recipient_id)],
                ),
            ],
        )
        .await?;

        tracing::info!("Friend request cancelled: {} -> {}", caller_id, recipient_id);
        Ok(())
    }

    pub async fn remove_friend(&self, caller_id: &str, friend_id: &str) -> Result<(), AppError> {
        require_caller(caller_id)?;
        require_peer(caller_id, friend_id)?;

        let mine = self.graph(caller_id).await?;
        if !mine.contains(Relation::Friends, friend_id) {
            return Err(AppError::NotFound("对方不是你的好友".into()));
        }

        self.commit(
            "remove_friend",
            vec![
                GraphUpdate::new(friend_id, vec![GraphEdit::remove(Relation::Friends, caller_id)]),
                GraphUpdate::new(caller_id, vec![GraphEdit::remove(Relation::Friends, friend_id)]),
            ],
        )
        .await?;

        tracing::info!("Friendship removed: {} <-> {}", caller_id, friend_id);
        Ok(())
    }

    pub async fn friends_of(&self, caller_id: &str) -> Result<FriendGraph, AppError> {
        require_caller(caller_id)?;
        self.graph(caller_id).await
    }

    /// 附近的人，不包含调用者自己
    pub async fn nearby_users(
        &self,
        caller_id: &str,
        longitude: f64,
        latitude: f64,
        radius_m: f64,
    ) -> Result<PresenceResult, AppError> {
        require_caller(caller_id)?;

        let result = self
            .proximity
            .find_nearby(
                EntityKind::User,
                GeoPoint::new(longitude, latitude),
                effective_radius(radius_m),
                &NearbyFilter::excluding(caller_id),
            )
            .await?;
        Ok(result.into())
    }

    /// 附近的好友，好友列表实时读取持久层
    pub async fn nearby_friends(
        &self,
        caller_id: &str,
        longitude: f64,
        latitude: f64,
        radius_m: f64,
    ) -> Result<PresenceResult, AppError> {
        require_caller(caller_id)?;
        let origin = GeoPoint::new(longitude, latitude);
        if !origin.is_valid() {
            return Err(AppError::InvalidInput(format!(
                "无效坐标: lat={}, lon={}",
                latitude, longitude
            )));
        }

        let graph = self.graph(caller_id).await?;
        let filter = NearbyFilter::excluding(caller_id).within(graph.friends);

        let result = self
            .proximity
            .find_nearby(EntityKind::User, origin, effective_radius(radius_m), &filter)
            .await?;
        Ok(result.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::Fixture;

    const CENTER: (f64, f64) = (103.85, 1.29);

    async fn graph_of(fx: &Fixture, id: &str) -> FriendGraph {
        fx.store.friend_graph(id).await.unwrap().unwrap()
    }

    async fn users(ids: &[&str]) -> Fixture {
        let fx = Fixture::new();
        for id in ids {
            fx.add_user(id, CENTER.0, CENTER.1).await;
        }
        fx
    }

    #[tokio::test]
    async fn send_records_both_sides() {
        let fx = users(&["a", "b"]).await;

        fx.social.send_request("a", "b").await.unwrap();

        assert!(graph_of(&fx, "a").await.contains(Relation::PendingOutgoing, "b"));
        assert!(graph_of(&fx, "b").await.contains(Relation::PendingIncoming, "a"));
    }

    #[tokio::test]
    async fn duplicate_and_symmetric_requests_conflict() {
        let fx = users(&["a", "b"]).await;
        fx.social.send_request("a", "b").await.unwrap();

        assert!(matches!(
            fx.social.send_request("a", "b").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            fx.social.send_request("b", "a").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn send_validates_parties() {
        let fx = users(&["a"]).await;

        assert!(matches!(
            fx.social.send_request("", "a").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            fx.social.send_request("a", "a").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.social.send_request("a", "ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn send_repairs_half_written_request() {
        let fx = users(&["a", "b"]).await;
        fx.store
            .apply_graph_updates(&[GraphUpdate::new(
                "a",
                vec![GraphEdit::add(Relation::PendingOutgoing, "b")],
            )])
            .await
            .unwrap();

        fx.social.send_request("a", "b").await.unwrap();

        assert!(graph_of(&fx, "b").await.contains(Relation::PendingIncoming, "a"));
        fx.social.accept_request("b", "a").await.unwrap();
    }

    #[tokio::test]
    async fn accept_makes_friends_and_clears_pending() {
        let fx = users(&["a", "b"]).await;
        fx.social.send_request("a", "b").await.unwrap();

        fx.social.accept_request("b", "a").await.unwrap();

        let a = graph_of(&fx, "a").await;
        let b = graph_of(&fx, "b").await;
        assert!(a.contains(Relation::Friends, "b"));
        assert!(b.contains(Relation::Friends, "a"));
        assert!(a.pending_outgoing.is_empty() && a.pending_incoming.is_empty());
        assert!(b.pending_outgoing.is_empty() && b.pending_incoming.is_empty());

        assert!(matches!(
            fx.social.accept_request("b", "a").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.social.send_request("a", "b").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn accept_requires_pending_request() {
        let fx = users(&["a", "b"]).await;

        assert!(matches!(
            fx.social.accept_request("b", "a").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.social.accept_request("b", "b").await,
            Err(AppError::InvalidInput(_))
        ));
        // 发送方不能替接收方接受
        fx.social.send_request("a", "b").await.unwrap();
        assert!(matches!(
            fx.social.accept_request("a", "b").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn decline_and_cancel_clear_both_sides() {
        let fx = users(&["a", "b"]).await;

        fx.social.send_request("a", "b").await.unwrap();
        fx.social.decline_request("b", "a").await.unwrap();
        assert_eq!(graph_of(&fx, "a").await, FriendGraph::default());
        assert_eq!(graph_of(&fx, "b").await, FriendGraph::default());

        fx.social.send_request("a", "b").await.unwrap();
        fx.social.cancel_request("a", "b").await.unwrap();
        assert_eq!(graph_of(&fx, "a").await, FriendGraph::default());
        assert_eq!(graph_of(&fx, "b").await, FriendGraph::default());

        assert!(matches!(
            fx.social.cancel_request("a", "b").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.social.decline_request("b", "a").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_friend_is_symmetric() {
        let fx = users(&["a", "b"]).await;
        fx.befriend("a", "b").await;

        fx.social.remove_friend("b", "a").await.unwrap();

        assert!(fx.social.friends_of("a").await.unwrap().friends.is_empty());
        assert!(fx.social.friends_of("b").await.unwrap().friends.is_empty());
        assert!(matches!(
            fx.social.remove_friend("a", "b").await,
            Err(AppError::NotFound(_))
        ));
        // 解除后可以重新发起
        fx.social.send_request("a", "b").await.unwrap();
    }

    #[tokio::test]
    async fn nearby_users_excludes_caller() {
        let fx = Fixture::new();
        fx.locate_user("a", CENTER.0, CENTER.1).await;
        fx.locate_user("b", CENTER.0 + 0.001, CENTER.1).await;
        fx.locate_user("c", CENTER.0 + 0.002, CENTER.1).await;

        let result = fx
            .social
            .nearby_users("a", CENTER.0, CENTER.1, 1000.0)
            .await
            .unwrap();

        let ids: Vec<_> = result.users.iter().map(|u| u.public_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(result.users[0].display_name, "B");
        assert_eq!(result.count, 2);
    }

    #[tokio::test]
    async fn nearby_users_defaults_radius() {
        let fx = Fixture::new();
        fx.locate_user("a", CENTER.0, CENTER.1).await;
        // 约 2.2 公里
        fx.locate_user("b", CENTER.0 + 0.02, CENTER.1).await;
        // 约 5.5 公里
        fx.locate_user("c", CENTER.0 + 0.05, CENTER.1).await;

        for radius in [0.0, -5.0] {
            let result = fx
                .social
                .nearby_users("a", CENTER.0, CENTER.1, radius)
                .await
                .unwrap();
            assert_eq!(result.radius, DEFAULT_PRESENCE_RADIUS_M);
            let ids: Vec<_> = result.users.iter().map(|u| u.public_id.as_str()).collect();
            assert_eq!(ids, vec!["b"]);
        }
    }

    #[tokio::test]
    async fn nearby_friends_only_returns_friends() {
        let fx = Fixture::new();
        fx.locate_user("a", CENTER.0, CENTER.1).await;
        fx.locate_user("b", CENTER.0 + 0.001, CENTER.1).await;
        fx.locate_user("c", CENTER.0 + 0.0005, CENTER.1).await;
        fx.befriend("a", "b").await;

        let everyone = fx
            .social
            .nearby_users("a", CENTER.0, CENTER.1, 1000.0)
            .await
            .unwrap();
        assert_eq!(everyone.count, 2);

        let friends = fx
            .social
            .nearby_friends("a", CENTER.0, CENTER.1, 1000.0)
            .await
            .unwrap();
        let ids: Vec<_> = friends.users.iter().map(|u| u.public_id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn nearby_friends_reads_fresh_graph() {
        let fx = Fixture::new();
        fx.locate_user("a", CENTER.0, CENTER.1).await;
        fx.locate_user("b", CENTER.0 + 0.001, CENTER.1).await;
        fx.befriend("a", "b").await;
        fx.social.remove_friend("a", "b").await.unwrap();

        let friends = fx
            .social
            .nearby_friends("a", CENTER.0, CENTER.1, 1000.0)
            .await
            .unwrap();
        assert_eq!(friends.count, 0);
    }

    #[tokio::test]
    async fn nearby_friends_requires_known_caller() {
        let fx = Fixture::new();

        assert!(matches!(
            fx.social.nearby_friends("ghost", CENTER.0, CENTER.1, 0.0).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.social.nearby_friends("", CENTER.0, CENTER.1, 0.0).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            fx.social.nearby_users("", CENTER.0, CENTER.1, 0.0).await,
            Err(AppError::Unauthorized)
        ));
    }
}
