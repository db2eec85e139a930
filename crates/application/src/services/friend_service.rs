use std::sync::Arc;

use domain::{DomainError, Username};

use crate::{clock::Clock, error::ApplicationError, locks::KeyedLocks, repository::UserRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestOutcome {
    Sent,
    AlreadyPending,
    AlreadyFriends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendResponseOutcome {
    Accepted,
    Declined,
    NoSuchRequest,
}

impl FriendRequestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FriendRequestOutcome::Sent => "sent",
            FriendRequestOutcome::AlreadyPending => "already_pending",
            FriendRequestOutcome::AlreadyFriends => "already_friends",
        }
    }
}

impl FriendResponseOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FriendResponseOutcome::Accepted => "accepted",
            FriendResponseOutcome::Declined => "declined",
            FriendResponseOutcome::NoSuchRequest => "no_such_request",
        }
    }
}

pub struct FriendServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct FriendService {
    deps: FriendServiceDependencies,
    locks: KeyedLocks,
}

impl FriendService {
    pub fn new(deps: FriendServiceDependencies) -> Self {
        Self {
            deps,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn friends(&self, username: &Username) -> Result<Vec<String>, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_username(username)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        // BTreeSet 已按用户名排序
        Ok(user
            .friends
            .iter()
            .map(|friend| friend.as_str().to_owned())
            .collect())
    }

    pub async fn send_friend_request(
        &self,
        from: &Username,
        to: &str,
    ) -> Result<FriendRequestOutcome, ApplicationError> {
        let to = Username::parse(to)?;
        if &to == from {
            return Err(ApplicationError::invalid_request(
                "cannot send a friend request to yourself",
            ));
        }

        let _guard = self.locks.lock(to.as_str()).await;
        let mut target = self
            .deps
            .user_repository
            .find_by_username(&to)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        if target.is_friend(from) {
            return Ok(FriendRequestOutcome::AlreadyFriends);
        }
        if !target.receive_friend_request(from.clone(), self.deps.clock.now())? {
            return Ok(FriendRequestOutcome::AlreadyPending);
        }
        self.deps.user_repository.update(target).await?;

        tracing::info!(from = %from, to = %to, "friend request sent");
        Ok(FriendRequestOutcome::Sent)
    }

    /// 接受时双方互相加为好友；两条用户记录在两把锁下一起更新。
    pub async fn respond_to_friend_request(
        &self,
        me: &Username,
        from: &str,
        accepted: bool,
    ) -> Result<FriendResponseOutcome, ApplicationError> {
        let from = Username::parse(from)?;
        if &from == me {
            return Err(ApplicationError::invalid_request(
                "cannot respond to your own friend request",
            ));
        }

        let _guards = self.locks.lock_pair(me.as_str(), from.as_str()).await;
        let repo = &self.deps.user_repository;
        let mut my_record = repo
            .find_by_username(me)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        let mut requester = repo
            .find_by_username(&from)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        let now = self.deps.clock.now();
        if !my_record.take_friend_request(&from, now) {
            return Ok(FriendResponseOutcome::NoSuchRequest);
        }

        if !accepted {
            repo.update(my_record).await?;
            tracing::info!(me = %me, from = %from, "friend request declined");
            return Ok(FriendResponseOutcome::Declined);
        }

        my_record.add_friend(from.clone(), now);
        requester.add_friend(me.clone(), now);
        repo.update(my_record).await?;
        repo.update(requester).await?;

        tracing::info!(me = %me, from = %from, "friend request accepted");
        Ok(FriendResponseOutcome::Accepted)
    }
}
