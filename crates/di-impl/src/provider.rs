//! 服务提供者

use crate::registry::ServiceRegistry;
use di_common::{DiResult, Value};

/// 服务提供者
///
/// 一组相关服务的注册入口。注册时传入的配置会以 `<name>.config`
/// 服务和同名参数的形式保存到容器中。
pub trait ServiceProvider: Send + Sync {
    /// 提供者名称
    fn name(&self) -> &str;

    /// 注册服务
    fn register(&self, registry: &mut ServiceRegistry, config: &Value) -> DiResult<()>;

    /// 编译前调用，可以增删或修改定义
    fn before_compile(&self, _registry: &mut ServiceRegistry) -> DiResult<()> {
        Ok(())
    }
}
