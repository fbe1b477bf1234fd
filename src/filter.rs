use crate::gateway::{FollowerPostBatch, Post};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityCriteria {
    pub language: String,
    /// Fewest target-language posts a follower needs to be kept at all.
    pub min_posts: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Filtered {
    pub posts: Vec<Post>,
    pub qualifying_followers: usize,
}

/// Keeps the target-language posts of followers who have at least
/// `min_posts` of them, flattened in follower order then post order.
/// A follower below the threshold contributes nothing.
pub fn filter_batches(batches: Vec<FollowerPostBatch>, criteria: &ActivityCriteria) -> Filtered {
    let mut filtered = Filtered::default();

    for batch in batches {
        let kept: Vec<Post> = batch
            .posts
            .into_iter()
            .filter(|post| post.language == criteria.language)
            .collect();

        if kept.len() < criteria.min_posts {
            continue;
        }
        filtered.qualifying_followers += 1;
        filtered.posts.extend(kept);
    }

    filtered
}
