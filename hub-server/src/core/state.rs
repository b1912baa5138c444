use std::sync::Arc;
use std::time::Duration;

use super::reference::ReferenceData;
use super::tasks::{BackgroundTasks, TaskKind};
use super::{Config, Result};
use crate::aggregator::AggregatorRegistry;
use crate::db::HubStorage;
use crate::notify::{Notifier, QueueNotifier, decorators};
use crate::orders::{
    AllowAll, OrderCreator, OrderPipeline, OrderStatusService, PipelineDeps, PreorderSweep,
    StatusRefresher,
};
use crate::pos::PosRegistry;
use crate::stoplist::{StoplistEngine, StoplistScheduler};

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，作为 axum 的 `State` 传给每个处理器。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | storage | redb 存储，实现全部 repository |
/// | reference | 静态参考数据 |
/// | stoplist | 停售传播引擎 |
/// | pipeline | 下单流程 (未装饰，供延迟提交扫描使用) |
/// | orders | 装饰后的下单入口 (webhook 使用) |
/// | status | 状态回写与取消 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub storage: Arc<HubStorage>,
    pub reference: Arc<ReferenceData>,
    pub stoplist: Arc<StoplistEngine>,
    pub pipeline: Arc<OrderPipeline>,
    pub orders: Arc<dyn OrderCreator>,
    pub status: Arc<OrderStatusService>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录
    /// 2. 参考数据
    /// 3. redb 存储 (work_dir/hub.redb)
    /// 4. 适配器注册表与通知客户端
    /// 5. 停售引擎、下单流程、状态服务
    pub async fn initialize(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(config.work_dir())?;
        let reference = ReferenceData::load(config.reference_data_path.as_deref())?;
        tracing::info!(
            signatures = reference.error_signatures.len(),
            "Reference data loaded"
        );

        let storage = Arc::new(HubStorage::open(&config.db_file)?);
        tracing::info!(path = %config.db_file, "Database opened");

        let aggregators = AggregatorRegistry::from_config(config)?;
        let pos = PosRegistry::from_config(config)?;
        let notifier: Arc<dyn Notifier> = Arc::new(QueueNotifier::new(
            config.notification_queue_url.clone(),
            config.http_timeout(),
        )?);

        Ok(Self::build(
            config.clone(),
            storage,
            Arc::new(reference),
            aggregators,
            pos,
            notifier,
        ))
    }

    /// Wire the services on top of already constructed infrastructure
    pub fn build(
        config: Config,
        storage: Arc<HubStorage>,
        reference: Arc<ReferenceData>,
        aggregators: AggregatorRegistry,
        pos: PosRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let stoplist = Arc::new(StoplistEngine::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            aggregators.clone(),
            pos.clone(),
            notifier.clone(),
            config.stoplist_queue.clone(),
        ));

        let pipeline = Arc::new(OrderPipeline::new(PipelineDeps {
            stores: storage.clone(),
            orders: storage.clone(),
            aggregators: aggregators.clone(),
            pos: pos.clone(),
            rules: Arc::new(AllowAll),
            stoplist: stoplist.clone(),
            notifier: notifier.clone(),
            reference: reference.clone(),
            log_link_template: config.log_link_template.clone(),
            default_queue: config.stoplist_queue.clone(),
        }));
        let orders = decorators::decorate(pipeline.clone(), storage.clone(), notifier);

        let status = Arc::new(OrderStatusService::new(
            storage.clone(),
            storage.clone(),
            aggregators,
            pos,
        ));

        Self {
            config,
            storage,
            reference,
            stoplist,
            pipeline,
            orders,
            status,
        }
    }

    /// 注册并启动所有后台任务
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let scheduler = StoplistScheduler::new(
            self.stoplist.clone(),
            self.storage.clone(),
            Duration::from_secs(self.config.stoplist_schedule_interval_secs),
            tasks.shutdown_token(),
        );
        tasks.spawn("stoplist_scheduler", TaskKind::Periodic, scheduler.run());

        let sweep = PreorderSweep::new(
            self.pipeline.clone(),
            self.storage.clone(),
            self.storage.clone(),
            Duration::from_secs(self.config.preorder_sweep_interval_secs),
            tasks.shutdown_token(),
        );
        tasks.spawn("preorder_sweep", TaskKind::Periodic, sweep.run());

        let refresher = StatusRefresher::new(
            self.status.clone(),
            self.storage.clone(),
            Duration::from_secs(self.config.status_refresh_interval_secs),
            tasks.shutdown_token(),
        );
        tasks.spawn("status_refresher", TaskKind::Periodic, refresher.run());

        tasks.log_summary();
        tasks
    }
}
