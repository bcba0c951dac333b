//! 结构比较工具模块
//!
//! 提供深比较、浅比较、id 集合比较以及键级差异计算，
//! 校验器与差异计算器都依赖这里的比较语义

use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

/// 超过该长度的数组在深比较时会记录性能警告
pub const LARGE_ARRAY_THRESHOLD: usize = 10_000;

/// 深比较两个任意嵌套的值
///
/// 数组按顺序逐元素比较；对象比较键集合与每个键的值（与键顺序无关）；
/// 类型不同一律视为不相等。数字按数值比较，`1` 与 `1.0` 相等。
///
/// # 参数
/// * `a` - 左值
/// * `b` - 右值
///
/// # 返回
/// * `bool` - 是否结构相等
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }

    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(_), Value::Number(_)) => numbers_equal(a, b),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                return false;
            }

            if x.len() > LARGE_ARRAY_THRESHOLD {
                warn!(
                    "深比较数组长度 {} 超过 {}，性能可能下降",
                    x.len(),
                    LARGE_ARRAY_THRESHOLD
                );
            }

            x.iter().zip(y.iter()).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => maps_deep_equal(x, y),
        _ => false,
    }
}

/// 深比较两个映射
pub fn maps_deep_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().all(|(key, left)| match b.get(key) {
        Some(right) => deep_equal(left, right),
        None => false,
    })
}

/// 两侧都是整数时精确比较，只有存在浮点数时才按 f64 比较
fn numbers_equal(a: &Value, b: &Value) -> bool {
    let (Value::Number(x), Value::Number(y)) = (a, b) else {
        return false;
    };

    if x.is_f64() || y.is_f64() {
        return match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
    }

    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => x == y,
        // 至少一侧超出 i64，只能按 u64 比较
        _ => x.as_u64().is_some() && x.as_u64() == y.as_u64(),
    }
}

/// 浅比较两个扁平映射（只比较一层）
///
/// 标量按值比较，嵌套的数组/对象只有在指向同一份数据时才视为相等。
///
/// @note 调用方修改某个未变键下的嵌套对象时，此函数无法察觉；
/// 需要可靠结果时使用 [`deep_diff`]。
pub fn shallow_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().all(|(key, left)| match b.get(key) {
        Some(right) => identity_equal(left, right),
        None => false,
    })
}

fn identity_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            std::ptr::eq(a, b)
        }
        (Value::Number(_), Value::Number(_)) => numbers_equal(a, b),
        _ => a == b,
    }
}

/// 比较两组 id（不关心顺序与重复）
pub fn ids_equal<A, B>(a: &[A], b: &[B]) -> bool
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let left: HashSet<&str> = a.iter().map(AsRef::as_ref).collect();
    let right: HashSet<&str> = b.iter().map(AsRef::as_ref).collect();
    left == right
}

/// 找出两个映射中值不同的键（深比较）
///
/// 只在一侧出现的键同样计入差异。
///
/// # 返回
/// * `Vec<String>` - 按字典序排列的差异键
pub fn deep_diff(a: &Map<String, Value>, b: &Map<String, Value>) -> Vec<String> {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();

    keys.into_iter()
        .filter(|key| match (a.get(*key), b.get(*key)) {
            (Some(left), Some(right)) => !deep_equal(left, right),
            _ => true,
        })
        .cloned()
        .collect()
}
