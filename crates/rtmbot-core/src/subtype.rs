//! Message subtypes reported by the chat platform.

use std::fmt;

/// Who or what originated a message, grouping related subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubtypeCategory {
    Human,
    Integration,
    Editing,
    Channel,
    Group,
    File,
    Pin,
    Unknown,
}

/// Subtype of a channel message.
///
/// `Message` is the plain default and has no wire representation: the
/// platform omits the `subtype` key for ordinary messages. Strings this
/// crate does not know are kept in `Other` so they survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum MessageSubtype {
    #[default]
    Message,
    MeMessage,

    BotMessage,

    MessageChanged,
    MessageDeleted,

    ChannelJoin,
    ChannelLeave,
    ChannelTopic,
    ChannelPurpose,
    ChannelName,
    ChannelArchive,
    ChannelUnarchive,

    GroupJoin,
    GroupLeave,
    GroupTopic,
    GroupPurpose,
    GroupName,
    GroupArchive,
    GroupUnarchive,

    FileShare,
    FileComment,
    FileMention,

    PinnedItem,
    UnpinnedItem,

    Other(String),
}

impl MessageSubtype {
    /// Parses the platform's `subtype` field. `None` and `""` are the default subtype.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value.unwrap_or("") {
            "" => Self::Message,
            "me_message" => Self::MeMessage,
            "bot_message" => Self::BotMessage,
            "message_changed" => Self::MessageChanged,
            "message_deleted" => Self::MessageDeleted,
            "channel_join" => Self::ChannelJoin,
            "channel_leave" => Self::ChannelLeave,
            "channel_topic" => Self::ChannelTopic,
            "channel_purpose" => Self::ChannelPurpose,
            "channel_name" => Self::ChannelName,
            "channel_archive" => Self::ChannelArchive,
            "channel_unarchive" => Self::ChannelUnarchive,
            "group_join" => Self::GroupJoin,
            "group_leave" => Self::GroupLeave,
            "group_topic" => Self::GroupTopic,
            "group_purpose" => Self::GroupPurpose,
            "group_name" => Self::GroupName,
            "group_archive" => Self::GroupArchive,
            "group_unarchive" => Self::GroupUnarchive,
            "file_share" => Self::FileShare,
            "file_comment" => Self::FileComment,
            "file_mention" => Self::FileMention,
            "pinned_item" => Self::PinnedItem,
            "unpinned_item" => Self::UnpinnedItem,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire string, or `None` for the default subtype.
    pub fn as_wire(&self) -> Option<&str> {
        let s = match self {
            Self::Message => return None,
            Self::MeMessage => "me_message",
            Self::BotMessage => "bot_message",
            Self::MessageChanged => "message_changed",
            Self::MessageDeleted => "message_deleted",
            Self::ChannelJoin => "channel_join",
            Self::ChannelLeave => "channel_leave",
            Self::ChannelTopic => "channel_topic",
            Self::ChannelPurpose => "channel_purpose",
            Self::ChannelName => "channel_name",
            Self::ChannelArchive => "channel_archive",
            Self::ChannelUnarchive => "channel_unarchive",
            Self::GroupJoin => "group_join",
            Self::GroupLeave => "group_leave",
            Self::GroupTopic => "group_topic",
            Self::GroupPurpose => "group_purpose",
            Self::GroupName => "group_name",
            Self::GroupArchive => "group_archive",
            Self::GroupUnarchive => "group_unarchive",
            Self::FileShare => "file_share",
            Self::FileComment => "file_comment",
            Self::FileMention => "file_mention",
            Self::PinnedItem => "pinned_item",
            Self::UnpinnedItem => "unpinned_item",
            Self::Other(s) => s.as_str(),
        };
        Some(s)
    }

    /// Returns the originator category of this subtype.
    pub fn category(&self) -> SubtypeCategory {
        match self {
            Self::Message | Self::MeMessage => SubtypeCategory::Human,
            Self::BotMessage => SubtypeCategory::Integration,
            Self::MessageChanged | Self::MessageDeleted => SubtypeCategory::Editing,
            Self::ChannelJoin
            | Self::ChannelLeave
            | Self::ChannelTopic
            | Self::ChannelPurpose
            | Self::ChannelName
            | Self::ChannelArchive
            | Self::ChannelUnarchive => SubtypeCategory::Channel,
            Self::GroupJoin
            | Self::GroupLeave
            | Self::GroupTopic
            | Self::GroupPurpose
            | Self::GroupName
            | Self::GroupArchive
            | Self::GroupUnarchive => SubtypeCategory::Group,
            Self::FileShare | Self::FileComment | Self::FileMention => SubtypeCategory::File,
            Self::PinnedItem | Self::UnpinnedItem => SubtypeCategory::Pin,
            Self::Other(_) => SubtypeCategory::Unknown,
        }
    }

    /// Returns true for the plain default subtype.
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Message)
    }
}

impl fmt::Display for MessageSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire().unwrap_or("message"))
    }
}
