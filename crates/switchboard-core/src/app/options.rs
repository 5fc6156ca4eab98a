//! MediatorOptions - ディスパッチエンジンの設定
//!
//! コードで `MediatorBuilder` から設定するか、JSON から読み込みます。
//!
//! ```json
//! { "pipeline_caching": "instances", "publish_strategy": "sequential" }
//! ```

use serde::{Deserialize, Serialize};

/// パイプラインキャッシュに何を残すか
///
/// - `Plan`: パイプラインの形（handler と behavior の Capability）だけを残し、
///   ディスパッチのたびに locator から新しいインスタンスを解決する。
///   コンテナ側の transient / scoped な寿命がそのまま効く。
/// - `Instances`: 初回に解決した handler / behavior のインスタンスを固定する。
///   以後の寿命は実質 singleton になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineCaching {
    #[default]
    Plan,
    Instances,
}

/// `publish` がどちらの配り方を使うか
///
/// `publish_concurrent` / `publish_sequential` は設定に関係なく常に使えます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    /// 全 handler を並行に実行し、全員の完了を待ってから失敗を集約する
    #[default]
    Concurrent,
    /// 登録順に 1 つずつ実行し、最初の失敗で止まる
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorOptions {
    pub pipeline_caching: PipelineCaching,
    pub publish_strategy: PublishStrategy,
}

impl MediatorOptions {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
