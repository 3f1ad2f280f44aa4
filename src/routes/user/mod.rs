mod handler;
mod model;

pub use handler::{
    accept_friend_request, cancel_friend_request, decline_friend_request, friends, nearby_friends,
    nearby_users, ping, remove_friend, send_friend_request,
};
