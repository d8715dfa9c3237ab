use std::fmt;

use crate::models::ListQueryOptions;

/// Identity of a memoized gateway call.
///
/// Options are stored in normalized form, so two requests that differ only in
/// field order or surrounding whitespace share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    List {
        list: String,
        options: ListQueryOptions,
    },
    ListItem {
        list: String,
        id: i64,
        options: ListQueryOptions,
    },
    CurrentUser {
        options: ListQueryOptions,
    },
    SiteUsers {
        options: ListQueryOptions,
    },
    SiteLists {
        options: ListQueryOptions,
    },
    UserProfile {
        login: String,
    },
}

impl CacheKey {
    pub fn list(list: impl Into<String>, options: &ListQueryOptions) -> Self {
        Self::List {
            list: list.into(),
            options: options.normalized(),
        }
    }

    pub fn list_item(list: impl Into<String>, id: i64, options: &ListQueryOptions) -> Self {
        Self::ListItem {
            list: list.into(),
            id,
            options: options.normalized(),
        }
    }

    pub fn current_user(options: &ListQueryOptions) -> Self {
        Self::CurrentUser {
            options: options.normalized(),
        }
    }

    pub fn site_users(options: &ListQueryOptions) -> Self {
        Self::SiteUsers {
            options: options.normalized(),
        }
    }

    pub fn site_lists(options: &ListQueryOptions) -> Self {
        Self::SiteLists {
            options: options.normalized(),
        }
    }

    pub fn user_profile(login: impl Into<String>) -> Self {
        Self::UserProfile {
            login: login.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::ListItem { .. } => "list-item",
            Self::CurrentUser { .. } => "current-user",
            Self::SiteUsers { .. } => "site-users",
            Self::SiteLists { .. } => "site-lists",
            Self::UserProfile { .. } => "user-profile",
        }
    }

    /// The list this key reads from, for list and list-item keys.
    pub fn list_name(&self) -> Option<&str> {
        match self {
            Self::List { list, .. } | Self::ListItem { list, .. } => Some(list),
            _ => None,
        }
    }

    /// True for collection keys of `list`, under any options.
    pub fn is_collection_of(&self, list: &str) -> bool {
        matches!(self, Self::List { list: l, .. } if l == list)
    }

    /// True for single-item keys of `list`/`id`, under any options.
    pub fn is_item_of(&self, list: &str, id: i64) -> bool {
        matches!(self, Self::ListItem { list: l, id: i, .. } if l == list && *i == id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List { list, options } => write!(f, "list:{}:{}", list, options.describe()),
            Self::ListItem { list, id, options } => {
                write!(f, "list-item:{}:{}:{}", list, id, options.describe())
            }
            Self::CurrentUser { options }
            | Self::SiteUsers { options }
            | Self::SiteLists { options } => write!(f, "{}:{}", self.kind(), options.describe()),
            Self::UserProfile { login } => write!(f, "user-profile:{}", login),
        }
    }
}
