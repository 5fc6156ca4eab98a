//! App - ディスパッチエンジン本体
//!
//! ports（HandlerLocator）と typed（メッセージ / handler trait）を組み合わせて
//! send / publish / create_stream を実装します。
//!
//! # 主要コンポーネント
//! - **MediatorBuilder**: 構築とワイヤリング
//! - **Mediator**: 3 つのメッセージパターンの入口
//! - **PipelineCache**: Request 型ごとの呼び出しチェーンのキャッシュ
//! - **ContractTable**: 型消去された呼び出しを型付き経路へ橋渡しする表
//! - **Sender / Publisher**: 呼び出し側が依存する狭い抽象

pub mod builder;
pub mod contracts;
pub mod facade;
pub mod mediator;
pub mod options;
pub(crate) mod pipeline;

pub use self::builder::{BuildError, MediatorBuilder};
pub use self::contracts::{AnyMessage, ContractTable, RegistryError, RequestContract};
pub use self::facade::{Publisher, Sender};
pub use self::mediator::Mediator;
pub use self::options::{MediatorOptions, PipelineCaching, PublishStrategy};
