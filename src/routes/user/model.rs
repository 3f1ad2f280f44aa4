use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub user_id: String,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct SendFriendRequest {
    pub recipient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptFriendRequest {
    pub sender_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeclineFriendRequest {
    pub sender_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelFriendRequest {
    pub recipient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFriendRequest {
    pub friend_id: String,
}

#[derive(Debug, Serialize)]
pub struct FriendActionResponse {
    pub user_id: String,
    pub peer_id: String,
}
