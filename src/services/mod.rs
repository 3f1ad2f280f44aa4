// 业务服务层
// 路由只做参数解析，所有规则都在这里

pub mod auth;
pub mod presence;
pub mod proximity;
pub mod social;

pub use auth::{AuthService, LoginToken};
pub use presence::{PresenceService, ReseedReport};
pub use proximity::{NearbyFilter, NearbyHit, NearbyResult, ProximityService};
pub use social::{NearbyPresence, PresenceResult, SocialService};
