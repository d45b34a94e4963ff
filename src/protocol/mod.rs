/// 最小 HTTP/1.1 协议子集
///
/// 只处理请求行、头部块和 Content-Length 请求体；响应方向提供错误响应、
/// 成功响应头的写出，以及代理模式下上游响应头的解析
pub mod request;
pub mod response;

pub use request::{read_request, HeadPolicy, Method, ParsedRequest};
pub use response::{read_response_head, write_error, BodyFraming, ResponseHead, UpstreamHead};

/// 在头部行列表里按名称（忽略大小写）查找最后一个值
pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// 把一行 `Key: Value` 拆成修剪过的键值对
pub(crate) fn split_header_line(line: &[u8]) -> Option<(String, String)> {
    let line = String::from_utf8_lossy(line);
    let (key, value) = line.split_once(':')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

/// 是否为头部块结束的空行
pub(crate) fn is_blank_line(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}
