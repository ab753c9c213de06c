/// Application name
pub const APP_NAME: &str = "GrindHub";

/// Path of the real-time endpoint on the server.
pub const WS_PATH: &str = "/ws";

/// Query parameter carrying the authenticated user id at handshake time.
pub const WS_USER_QUERY: &str = "userId";

/// Default HTTP port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5001;

/// Maximum accepted chat body length in bytes (16 KiB)
pub const MAX_MESSAGE_BODY: usize = 16 * 1024;

/// Default room capacity when the creator does not pick one.
pub const DEFAULT_ROOM_CAPACITY: u32 = 50;

/// Daily goal bounds and default, in minutes.
pub const DAILY_GOAL_MIN_MINUTES: u32 = 5;
pub const DAILY_GOAL_MAX_MINUTES: u32 = 480;
pub const DAILY_GOAL_DEFAULT_MINUTES: u32 = 60;

/// Request header carrying the authenticated user id on REST calls.
pub const USER_HEADER: &str = "x-user-id";
