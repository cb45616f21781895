//! Bot state owned by the connection: joined channels and bot admins.

/// Why an admin list change was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    #[error("{0} is already a bot admin")]
    AlreadyAdmin(String),
    #[error("{0} is not on the list of bot admins")]
    NotAdmin(String),
    #[error("{0} is the only bot admin")]
    LastAdmin(String),
}

/// Channels the bot believes it is in, in join order.
///
/// Join order is kept so a reconnect rejoins in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    channels: Vec<String>,
}

impl ChannelSet {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for chan in channels {
            set.insert(chan.into());
        }
        set
    }

    /// Returns `false` when already present.
    pub(crate) fn insert(&mut self, channel: String) -> bool {
        if self.contains(&channel) {
            return false;
        }
        self.channels.push(channel);
        true
    }

    pub(crate) fn remove(&mut self, channel: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c != channel);
        self.channels.len() != before
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Nicks allowed to run admin commands. Never empty once constructed with
/// at least one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminList {
    admins: Vec<String>,
}

impl AdminList {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for admin in admins {
            let _ = list.add(admin.into());
        }
        list
    }

    pub fn is_admin(&self, nick: &str) -> bool {
        self.admins.iter().any(|a| a == nick)
    }

    pub fn add(&mut self, nick: String) -> Result<(), AdminError> {
        if self.is_admin(&nick) {
            return Err(AdminError::AlreadyAdmin(nick));
        }
        self.admins.push(nick);
        Ok(())
    }

    pub fn remove(&mut self, nick: &str) -> Result<(), AdminError> {
        if !self.is_admin(nick) {
            return Err(AdminError::NotAdmin(nick.to_string()));
        }
        if self.admins.len() == 1 {
            return Err(AdminError::LastAdmin(nick.to_string()));
        }
        self.admins.retain(|a| a != nick);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.admins.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_set_keeps_order_and_dedups() {
        let mut set = ChannelSet::new(["#b", "#a", "#b"]);
        assert_eq!(set.iter().collect::<Vec<_>>(), ["#b", "#a"]);
        assert!(!set.insert("#a".into()));
        assert!(set.insert("#c".into()));
        assert!(set.remove("#b"));
        assert!(!set.remove("#b"));
        assert_eq!(set.iter().collect::<Vec<_>>(), ["#a", "#c"]);
    }

    #[test]
    fn last_admin_cannot_be_removed() {
        let mut admins = AdminList::new(["GorillaWarfare"]);
        assert_eq!(
            admins.remove("GorillaWarfare"),
            Err(AdminError::LastAdmin("GorillaWarfare".into()))
        );
        admins.add("Oliver".into()).unwrap();
        admins.remove("GorillaWarfare").unwrap();
        assert_eq!(admins.iter().collect::<Vec<_>>(), ["Oliver"]);
    }

    #[test]
    fn admin_add_and_remove_errors() {
        let mut admins = AdminList::new(["a", "b"]);
        assert_eq!(admins.add("a".into()), Err(AdminError::AlreadyAdmin("a".into())));
        assert_eq!(admins.remove("z"), Err(AdminError::NotAdmin("z".into())));
        assert!(admins.is_admin("b"));
        assert_eq!(admins.len(), 2);
    }
}
