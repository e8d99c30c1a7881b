use std::ops::ControlFlow;

use application::{ApplicationError, Session};
use axum::{
    body::Bytes,
    extract::ws::{Message as WsMessage, WebSocket},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    error::{ApiError, ErrorBody},
    protocol::{ClientFrame, InboundRequest, ServerFrame},
};

/// WebSocket 连接管理器
///
/// 一个已认证的 [`Session`] 加上它的 socket：
/// - 发送任务独占 socket 的写端，合并推送事件与应答
/// - 接收循环解析客户端帧并交给会话处理
/// - 任一方结束即断开，会话随之清理房间成员关系
pub struct WebSocketConnection {
    socket: WebSocket,
    session: Session,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, session: Session) -> Self {
        Self { socket, session }
    }

    /// 运行连接直到客户端关闭或传输出错
    pub async fn run(self) {
        let Self {
            socket,
            mut session,
        } = self;
        let connection_id = session.id();

        let Some(mut events) = session.take_events() else {
            tracing::warn!(connection_id = %connection_id, "session has no event stream");
            return;
        };

        let (mut sender, mut incoming) = socket.split();

        // 应答和 pong 经由命令通道交给发送任务，保证写端只有一个持有者
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            loop {
                let outgoing = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendText(text) => WsMessage::Text(text.into()),
                        WsCommand::SendPong(data) => WsMessage::Pong(data),
                    },
                    Some(event) = events.recv() => {
                        match ServerFrame::from(event.as_ref()).to_text() {
                            Ok(text) => WsMessage::Text(text.into()),
                            Err(err) => {
                                tracing::warn!(error = %err, event = event.label(), "failed to serialize event");
                                continue;
                            }
                        }
                    }
                    else => break,
                };

                if sender.send(outgoing).await.is_err() {
                    tracing::debug!("websocket sink closed");
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = &mut send_task => {
                    tracing::debug!(connection_id = %connection_id, "send task finished");
                    break;
                }
                frame = incoming.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            tracing::debug!(connection_id = %connection_id, error = %err, "websocket transport error");
                            break;
                        }
                        None => break,
                    };
                    if Self::handle_incoming(&mut session, message, &cmd_tx).await.is_break() {
                        break;
                    }
                }
            }
        }

        send_task.abort();
        session.disconnect();
    }

    /// 处理来自客户端的一帧
    async fn handle_incoming(
        session: &mut Session,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> ControlFlow<()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!(connection_id = %session.id(), "close frame received");
                ControlFlow::Break(())
            }
            WsMessage::Ping(data) => send(cmd_tx, WsCommand::SendPong(data)).await,
            WsMessage::Pong(_) => ControlFlow::Continue(()),
            WsMessage::Text(text) => {
                let reply = Self::handle_text(session, text.as_str()).await;
                match reply {
                    Some(frame) => reply_with(cmd_tx, &frame).await,
                    None => ControlFlow::Continue(()),
                }
            }
            WsMessage::Binary(_) => {
                let body = ErrorBody::new("BAD_FRAME", "binary frames are not supported");
                reply_with(cmd_tx, &ServerFrame::error(None, &body)).await
            }
        }
    }

    /// 执行一条文本请求，返回需要回给客户端的帧
    ///
    /// 成功只在带 `requestId` 时回复 `ack`。错误通常都会回复，
    /// 但没有 `requestId` 的越权请求被静默丢弃。
    async fn handle_text(session: &mut Session, text: &str) -> Option<ServerFrame> {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(body) => return Some(ServerFrame::error(None, &body)),
        };
        let request_id = frame.request_id.clone();

        let command = match frame.into_request() {
            Ok(InboundRequest::Ping) => return Some(ServerFrame::pong(request_id)),
            Ok(InboundRequest::Command(command)) => command,
            Err(body) => return Some(ServerFrame::error(request_id, &body)),
        };

        match session.dispatch(command).await {
            Ok(outcome) => request_id.map(|id| ServerFrame::ack(Some(id), &outcome)),
            Err(ApplicationError::Authorization(reason)) if request_id.is_none() => {
                tracing::debug!(
                    connection_id = %session.id(),
                    reason = %reason,
                    "unauthorized request dropped"
                );
                None
            }
            Err(err) => {
                let error = ApiError::from(err);
                tracing::debug!(
                    connection_id = %session.id(),
                    code = error.body().code,
                    "request rejected"
                );
                Some(ServerFrame::error(request_id, error.body()))
            }
        }
    }
}

async fn reply_with(cmd_tx: &mpsc::Sender<WsCommand>, frame: &ServerFrame) -> ControlFlow<()> {
    match frame.to_text() {
        Ok(text) => send(cmd_tx, WsCommand::SendText(text)).await,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize reply");
            ControlFlow::Continue(())
        }
    }
}

async fn send(cmd_tx: &mpsc::Sender<WsCommand>, cmd: WsCommand) -> ControlFlow<()> {
    if cmd_tx.send(cmd).await.is_err() {
        tracing::debug!("send task is gone");
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Bytes),
}
