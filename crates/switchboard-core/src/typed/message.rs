//! Message traits - Request / Notification / StreamRequest の定義
//!
//! # 学習ポイント
//! - Associated Types（`type Response`）で応答型を静的に固定する
//! - Associated Constants（`const NAME`）で文字列キーと型を対応付ける
//! - Trait bounds の組み合わせ（Send + 'static で Box<dyn Any> に入れられる）

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Request は応答型 `Response` を 1 つだけ持つメッセージ
///
/// 具体的な Request 型ごとに handler はちょうど 1 つ。
/// 戻り値のないコマンドは `type Response = ();` にします。
///
/// # 使用例
/// ```ignore
/// struct CreateAccount {
///     owner: String,
/// }
///
/// impl Request for CreateAccount {
///     type Response = AccountId;
/// }
/// ```
pub trait Request: Send + 'static {
    type Response: Send + 'static;
}

/// Notification は 0 個以上の handler に配られるメッセージ
///
/// handler は `&N` を受け取るので、同じ値を複数の handler で共有します。
pub trait Notification: Send + Sync + 'static {}

/// StreamRequest は `Item` の列を返す Request
pub trait StreamRequest: Send + 'static {
    type Item: Send + 'static;
}

/// NamedRequest は名前と JSON で送れる Request
///
/// # 命名規約
/// - `{namespace}.{domain}.{action}.v{major}`
/// - 例: `ledger.transactions.create.v1`
pub trait NamedRequest: Request<Response: Serialize> + DeserializeOwned {
    const NAME: &'static str;
}
