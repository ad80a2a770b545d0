//! Destination naming used by the cluster's message broker.

/// Per-resource topic, e.g. `/topic/auction/42`.
pub fn resource_topic(kind: &str, id: &str) -> String {
    format!("/topic/{kind}/{id}")
}

/// Collection-wide topic, e.g. `/topic/auctions`.
pub fn collection_topic(collection: &str) -> String {
    format!("/topic/{collection}")
}

/// Cluster status broadcasts.
pub const SERVER_STATUS: &str = "/topic/server-status";

/// Application action destination, e.g. `/app/bid`.
pub fn action(name: &str) -> String {
    format!("/app/{name}")
}

/// Private per-user reply queue, e.g. `/user/queue/subscription-response`.
pub fn user_queue(name: &str) -> String {
    format!("/user/queue/{name}")
}

/// Reply queue for follow requests.
pub const FOLLOW_REPLY_QUEUE: &str = "subscription-response";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(resource_topic("auction", "42"), "/topic/auction/42");
        assert_eq!(collection_topic("auctions"), "/topic/auctions");
        assert_eq!(action("bid"), "/app/bid");
        assert_eq!(user_queue(FOLLOW_REPLY_QUEUE), "/user/queue/subscription-response");
    }
}
