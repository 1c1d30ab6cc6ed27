//! 协议常量定义

/// 单次读取的最大字节数，即一条消息的上限（无分帧协议）
pub const MAX_CHUNK_SIZE: usize = 256;

/// 默认聊天室名称
pub const DEFAULT_ROOM_NAME: &str = "Chatroom";

/// 默认网络类型
pub const DEFAULT_NETWORK: &str = "tcp";

/// 默认监听地址（空主机表示所有网卡）
pub const DEFAULT_ADDRESS: &str = ":8080";

/// 用户名冲突时服务端回复的完整文本
pub const USERNAME_TAKEN: &str = "Username already taken. Please try again.\n";

/// 客户端识别用户名冲突所用的子串
pub const USERNAME_TAKEN_MARKER: &str = "Username already taken";

/// 客户端发送失败后写入输出端的提示
pub const DISCONNECTED_NOTICE: &str = "Disconnected from the server";

/// 消息总线队列容量
pub const MESSAGE_QUEUE_CAPACITY: usize = 128;

/// 错误上报队列容量
pub const ERROR_QUEUE_CAPACITY: usize = 128;
